//! Command line and resolved projection configuration.

use clap::Parser;
use std::path::PathBuf;

/// 3D surface the captured window is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Sphere,
    Cylinder,
    Flat,
}

/// How the halves of the captured window are assigned to the eyes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    LeftRight,
    RightLeft,
    /// Whole window shown to both eyes
    Plane,
}

/// Smallest cursor scale accepted; anything lower is raised to it.
pub const MIN_CURSOR_SCALE: f32 = 0.01;

/// Directory of the per-window zoom file read by external tools. Fixed so
/// readers find it regardless of the environment.
pub const SCRATCH_DIR: &str = "/tmp";

/// Resolved projection parameters. Only `zoom` changes after startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionConfig {
    pub mode: ProjectionMode,
    pub view_mode: ViewMode,
    pub stretch: bool,
    pub cursor_wrap: bool,
    pub cursor_scale: f32,
    pub zoom: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::Sphere,
            view_mode: ViewMode::LeftRight,
            stretch: true,
            cursor_wrap: true,
            cursor_scale: MIN_CURSOR_SCALE,
            zoom: 0.0,
        }
    }
}

/// Everything the player needs to start
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub projection: ProjectionConfig,
    pub window_id: u64,
    /// Pace presentation to the display and flush the GPU every frame
    pub vsync: bool,
    /// Directory holding the per-window zoom scratch file
    pub scratch_dir: PathBuf,
    /// Searched for `images/` and `config/` before the system data directory
    pub asset_dir: PathBuf,
}

/// View an X11 window as a stereoscopic surface in VR.
#[derive(Parser, Debug)]
#[command(name = "vr-video-player", version, about)]
pub struct Cli {
    /// View the window as a 180 degree half sphere attached to your head (default)
    #[arg(long, conflicts_with = "flat")]
    pub sphere: bool,

    /// View the window as a flat stereoscopic screen
    #[arg(long)]
    pub flat: bool,

    /// Left half of the window goes to the left eye (default)
    #[arg(long, conflicts_with = "right_left")]
    pub left_right: bool,

    /// Left half of the window goes to the right eye
    #[arg(long)]
    pub right_left: bool,

    /// View the window as a slightly curved, non-stereoscopic screen
    #[arg(long, conflicts_with_all = ["sphere", "flat", "left_right", "right_left"])]
    pub plane: bool,

    /// Stretch both halves of the window to the combined width (default)
    #[arg(long, overrides_with = "no_stretch")]
    pub stretch: bool,

    /// Show each half of the window at the size of the whole window
    #[arg(long, overrides_with = "stretch")]
    pub no_stretch: bool,

    /// Distance to the window [default: 0 for sphere, 1 otherwise]
    #[arg(long, value_name = "ZOOM", allow_negative_numbers = true)]
    pub zoom: Option<f64>,

    /// Cursor size, 0 hides it [default: 0.01 for sphere, 1 otherwise]
    #[arg(long, value_name = "SCALE")]
    pub cursor_scale: Option<f32>,

    /// Wrap the cursor around at the middle of the window
    #[arg(long, overrides_with = "no_cursor_wrap")]
    pub cursor_wrap: bool,

    /// Keep the cursor at its real position inside the window
    #[arg(long, overrides_with = "cursor_wrap")]
    pub no_cursor_wrap: bool,

    /// Wait for vertical blank and flush the GPU before presenting
    #[arg(long)]
    pub vsync: bool,

    /// X11 id of the window to view, decimal or 0x hex, optionally prefixed with `window:`
    #[arg(value_name = "WINDOW_ID", value_parser = parse_window_id)]
    pub window_id: u64,
}

impl Cli {
    /// Apply mode-dependent defaults and produce the runtime configuration.
    pub fn resolve(self) -> AppConfig {
        let (mode, view_mode) = if self.plane {
            (ProjectionMode::Cylinder, ViewMode::Plane)
        } else {
            let mode = if self.flat {
                ProjectionMode::Flat
            } else {
                ProjectionMode::Sphere
            };
            let view_mode = if self.right_left {
                ViewMode::RightLeft
            } else {
                ViewMode::LeftRight
            };
            (mode, view_mode)
        };

        let zoom = self.zoom.unwrap_or(match mode {
            ProjectionMode::Sphere => 0.0,
            _ => 1.0,
        });

        let cursor_scale = match self.cursor_scale {
            Some(scale) if scale >= MIN_CURSOR_SCALE => scale,
            Some(_) => MIN_CURSOR_SCALE,
            None if mode == ProjectionMode::Sphere => MIN_CURSOR_SCALE,
            None => 1.0,
        };

        let cursor_wrap = if self.cursor_wrap {
            true
        } else if self.no_cursor_wrap {
            false
        } else {
            mode != ProjectionMode::Flat
        };

        AppConfig {
            projection: ProjectionConfig {
                mode,
                view_mode,
                stretch: !self.no_stretch,
                cursor_wrap,
                cursor_scale,
                zoom,
            },
            window_id: self.window_id,
            vsync: self.vsync,
            scratch_dir: PathBuf::from(SCRATCH_DIR),
            asset_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Parse a window id the way X11 tools print them: decimal, `0x` hex or
/// leading-zero octal, optionally prefixed with `window:`.
pub fn parse_window_id(raw: &str) -> Result<u64, String> {
    let id = raw.strip_prefix("window:").unwrap_or(raw);

    let parsed = if let Some(hex) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if id.len() > 1 && id.starts_with('0') {
        u64::from_str_radix(&id[1..], 8)
    } else {
        id.parse::<u64>()
    };

    match parsed {
        Ok(0) => Err(format!("window id must be non-zero, got `{raw}`")),
        Ok(id) => Ok(id),
        Err(e) => Err(format!("`{raw}` is not a window id: {e}")),
    }
}
