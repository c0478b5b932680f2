//! Source window size tracking and mesh regeneration requests
//!
//! Window size changes arrive in bursts while the user drags a border, so the
//! controller waits for the size to settle before asking for a new capture
//! texture and mesh. Zoom changes regenerate right away.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::config::ProjectionConfig;

/// Quiet period after the last size change before the resize is applied
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Zoom change per key press
pub const ZOOM_STEP: f64 = 0.01;

/// Tag identifying one allocation of the capture texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameGeneration(u64);

impl FrameGeneration {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Dimensions of the frame the mesh and capture texture are built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    pub generation: FrameGeneration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeState {
    Stable,
    PendingResize { since: Instant },
}

/// Why the mesh has to be rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regenerate {
    /// Source size settled; reallocate the capture texture first
    Resize,
    Zoom,
}

/// Per-window file holding the current zoom so external tools can read it
#[derive(Debug, Clone)]
pub struct ZoomScratch {
    path: PathBuf,
}

impl ZoomScratch {
    pub fn new(dir: &Path, window_id: u64) -> Self {
        Self {
            path: dir.join(format!("vr-video-player_{window_id}")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, zoom: f64) -> io::Result<()> {
        fs::write(&self.path, format_zoom(zoom))
    }
}

// Shortest form that survives a round trip through f32, so repeated steps
// print as 1.01 rather than 1.0100000000000002.
fn format_zoom(zoom: f64) -> String {
    format!("{}", zoom as f32)
}

pub struct ResizeController {
    state: ResizeState,
    window_size: (u32, u32),
    frame: SourceFrame,
    zoom_requested: bool,
    scratch: ZoomScratch,
}

impl ResizeController {
    /// `window_size` is the current source window size, `frame_size` the size
    /// of the first captured frame.
    pub fn new(window_size: (u32, u32), frame_size: (u32, u32), scratch: ZoomScratch) -> Self {
        Self {
            state: ResizeState::Stable,
            window_size,
            frame: SourceFrame {
                width: frame_size.0,
                height: frame_size.1,
                generation: FrameGeneration::default(),
            },
            zoom_requested: false,
            scratch,
        }
    }

    pub fn state(&self) -> ResizeState {
        self.state
    }

    /// Latest reported window size, used for cursor placement
    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    /// Applied frame, used for the mesh and the capture texture
    pub fn frame(&self) -> SourceFrame {
        self.frame
    }

    pub fn scratch(&self) -> &ZoomScratch {
        &self.scratch
    }

    /// Record a window size report. Only actual changes (re)start the
    /// debounce window.
    pub fn observe_window_size(&mut self, width: u32, height: u32, now: Instant) {
        if (width, height) == self.window_size {
            return;
        }
        debug!(
            "source window resized {}x{} -> {width}x{height}",
            self.window_size.0, self.window_size.1
        );
        self.window_size = (width, height);
        self.state = ResizeState::PendingResize { since: now };
    }

    /// Returns the regeneration due at `now`, if any.
    pub fn poll(&mut self, now: Instant) -> Option<Regenerate> {
        if let ResizeState::PendingResize { since } = self.state {
            if now.saturating_duration_since(since) >= RESIZE_DEBOUNCE {
                self.state = ResizeState::Stable;
                // the resize rebuilds the mesh with the current zoom as well
                self.zoom_requested = false;
                return Some(Regenerate::Resize);
            }
        }

        if self.zoom_requested {
            self.zoom_requested = false;
            return Some(Regenerate::Zoom);
        }

        None
    }

    /// Commit the re-queried source dimensions after a `Regenerate::Resize`.
    pub fn apply_resize(&mut self, width: u32, height: u32) -> SourceFrame {
        self.frame = SourceFrame {
            width,
            height,
            generation: self.frame.generation.next(),
        };
        info!(
            "capture texture resized to {width}x{height} (generation {})",
            self.frame.generation.value()
        );
        self.frame
    }

    /// Change the zoom, persist it and request a regeneration for the next poll.
    pub fn adjust_zoom(&mut self, projection: &mut ProjectionConfig, delta: f64) -> io::Result<()> {
        projection.zoom += delta;
        self.zoom_requested = true;
        debug!("zoom {}", projection.zoom);
        self.scratch.write(projection.zoom)
    }
}
