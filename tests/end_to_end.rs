use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::Vec2;
use image::RgbaImage;

use vr_video_player::capture::{WindowGeometry, WindowSource};
use vr_video_player::config::{Cli, ProjectionMode, ViewMode};
use vr_video_player::context::AppContext;
use vr_video_player::error::Result;
use vr_video_player::hmd::DesktopHmd;
use vr_video_player::input::{ActionManifest, ActionRegistry, GamepadSnapshot};
use vr_video_player::resize::Regenerate;
use vr_video_player::triggers::{TriggerTable, SIGNAL_SLOTS};
use vr_video_player::{assets, mesh};

static NO_SIGNALS: [AtomicBool; SIGNAL_SLOTS] = [const { AtomicBool::new(false) }; SIGNAL_SLOTS];

/// Source window whose pointer sweeps across it
struct SweepingWindow {
    geometry: WindowGeometry,
    step: u32,
}

impl WindowSource for SweepingWindow {
    fn geometry(&mut self) -> Result<WindowGeometry> {
        Ok(self.geometry)
    }

    fn grab(&mut self) -> Result<RgbaImage> {
        Ok(RgbaImage::new(self.geometry.width, self.geometry.height))
    }

    fn pointer(&mut self) -> Vec2 {
        self.step += 1;
        Vec2::new((self.step * 97 % self.geometry.width) as f32, 300.0)
    }
}

#[test]
fn flat_right_left_without_cursor() {
    let cli = Cli::try_parse_from([
        "vr-video-player",
        "--flat",
        "--right-left",
        "--no-stretch",
        "--zoom",
        "2",
        "--cursor-scale",
        "0",
        "0x3a00007",
    ])
    .unwrap();
    let mut config = cli.resolve();
    let scratch = tempfile::tempdir().unwrap();
    config.scratch_dir = scratch.path().to_path_buf();

    assert_eq!(config.window_id, 0x3a00007);
    assert_eq!(config.projection.mode, ProjectionMode::Flat);
    assert_eq!(config.projection.view_mode, ViewMode::RightLeft);
    assert!(!config.projection.stretch);
    assert_eq!(config.projection.zoom, 2.0);

    let base = Path::new(env!("CARGO_MANIFEST_DIR"));
    let arrow = assets::load_arrow_image(base).unwrap();
    let manifest = ActionManifest::load(&assets::action_manifest_path(base).unwrap()).unwrap();
    let actions = ActionRegistry::from_manifest(&manifest).unwrap();

    let mut hmd = DesktopHmd::new((640, 720));
    let geometry = WindowGeometry { x: 100, y: 50, width: 1920, height: 1080 };
    let mut ctx = AppContext::new(
        config.clone(),
        &hmd,
        geometry,
        geometry.size(),
        actions,
        TriggerTable::standard().with_flags(&NO_SIGNALS),
        arrow.dimensions(),
    )
    .unwrap();

    assert_eq!(ctx.mesh(), &mesh::generate(&config.projection, 1920, 1080).unwrap());
    let half_width = ctx
        .mesh()
        .vertices
        .iter()
        .map(|v| v.position[0].abs())
        .fold(0.0f32, f32::max);
    assert!((half_width - 0.25 * 1920.0 / 1080.0).abs() < 1e-5);

    let mut source = SweepingWindow { geometry, step: 0 };
    let start = Instant::now();
    for frame in 0..120u64 {
        let now = start + Duration::from_millis(frame * 11);
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), now);

        assert_eq!(plan.regenerated, None);
        assert_eq!(plan.eyes[0].sampling.offset_x, 0.5);
        assert_eq!(plan.eyes[1].sampling.offset_x, 0.0);
        for eye in &plan.eyes {
            assert!(!eye.cursor.is_visible(), "frame {frame}: {:?}", eye.cursor);
        }
    }

    assert!(!ctx.should_quit());
    assert_eq!(ctx.config.projection.zoom, 2.0);
    assert_eq!(ctx.resize.frame().width, 1920);
}

#[test]
fn zoom_keys_persist_and_regenerate() {
    let cli = Cli::try_parse_from(["vr-video-player", "--flat", "--zoom", "2", "window:12345"]).unwrap();
    let mut config = cli.resolve();
    let scratch = tempfile::tempdir().unwrap();
    config.scratch_dir = scratch.path().to_path_buf();

    let base = Path::new(env!("CARGO_MANIFEST_DIR"));
    let manifest = ActionManifest::load(&assets::action_manifest_path(base).unwrap()).unwrap();
    let mut hmd = DesktopHmd::new((640, 720));
    let geometry = WindowGeometry { x: 0, y: 0, width: 800, height: 600 };
    let mut ctx = AppContext::new(
        config,
        &hmd,
        geometry,
        geometry.size(),
        ActionRegistry::from_manifest(&manifest).unwrap(),
        TriggerTable::standard().with_flags(&NO_SIGNALS),
        (32, 32),
    )
    .unwrap();
    let before = ctx.mesh().clone();

    let q = winit::keyboard::Key::Character(winit::keyboard::SmolStr::new("q"));
    assert!(ctx.handle_key(&q));
    let mut source = SweepingWindow { geometry, step: 0 };
    let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), Instant::now());

    assert_eq!(plan.regenerated, Some(Regenerate::Zoom));
    assert!((ctx.config.projection.zoom - 1.99).abs() < 1e-9);
    assert_ne!(ctx.mesh(), &before);
    let written = std::fs::read_to_string(scratch.path().join("vr-video-player_12345")).unwrap();
    assert_eq!(written, "1.99");
}
