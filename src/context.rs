//! Per-frame player state
//!
//! `AppContext` owns everything the frame loop updates that is not GPU state:
//! configuration, head composition, resize tracking, input actions and the
//! trigger table. `prepare_frame` runs the CPU half of a frame and hands the
//! renderer what it needs to draw both eyes.

use std::time::Instant;

use log::{info, warn};
use winit::keyboard::Key;

use crate::capture::{report_capture_failure, WindowGeometry, WindowSource};
use crate::config::AppConfig;
use crate::cursor::{self, PointerFrame};
use crate::error::Result;
use crate::hmd::VrRuntime;
use crate::input::{ActionRegistry, GamepadSnapshot, RESET_ACTION};
use crate::mesh::{self, ProjectionMesh};
use crate::pose::{Eye, EyeView, ViewComposer, FAR_CLIP, NEAR_CLIP};
use crate::renderer::EyeFrame;
use crate::resize::{Regenerate, ResizeController, SourceFrame, ZoomScratch};
use crate::triggers::{Action, TriggerTable};

/// CPU side result of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    /// Set when the mesh was rebuilt this frame
    pub regenerated: Option<Regenerate>,
    /// Set when the capture texture must be reallocated before uploading
    pub resized: Option<SourceFrame>,
    pub eyes: [EyeFrame; 2],
}

pub struct AppContext {
    pub config: AppConfig,
    pub composer: ViewComposer,
    pub resize: ResizeController,
    pub actions: ActionRegistry,
    pub triggers: TriggerTable,
    mesh: ProjectionMesh,
    arrow_image: (u32, u32),
    pending: Vec<Action>,
    quit: bool,
}

impl AppContext {
    /// `geometry` is the source window as reported by the window system,
    /// `frame_size` the size of the first captured image.
    pub fn new(
        config: AppConfig,
        runtime: &dyn VrRuntime,
        geometry: WindowGeometry,
        frame_size: (u32, u32),
        actions: ActionRegistry,
        triggers: TriggerTable,
        arrow_image: (u32, u32),
    ) -> Result<Self> {
        let eye_view = |eye| {
            EyeView::new(
                &runtime.projection_matrix(eye, NEAR_CLIP, FAR_CLIP),
                &runtime.eye_to_head_transform(eye),
            )
        };
        let composer = ViewComposer::new(config.projection.mode, eye_view(Eye::Left), eye_view(Eye::Right));

        let scratch = ZoomScratch::new(&config.scratch_dir, config.window_id);
        let resize = ResizeController::new(geometry.size(), frame_size, scratch);

        let mesh = mesh::generate(&config.projection, frame_size.0, frame_size.1)?;
        info!(
            "{:?} projection, {:?}, zoom {}, {} vertices",
            config.projection.mode,
            config.projection.view_mode,
            config.projection.zoom,
            mesh.vertex_count()
        );

        Ok(Self {
            config,
            composer,
            resize,
            actions,
            triggers,
            mesh,
            arrow_image,
            pending: Vec::new(),
            quit: false,
        })
    }

    pub fn mesh(&self) -> &ProjectionMesh {
        &self.mesh
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Queue the action bound to a companion window key. Returns whether the
    /// key is bound.
    pub fn handle_key(&mut self, key: &Key) -> bool {
        match self.triggers.key_action(key) {
            Some(action) => {
                self.pending.push(action);
                true
            }
            None => false,
        }
    }

    /// Run the CPU half of a frame: triggers, input, source geometry, poses,
    /// recenter and mesh regeneration, then per-eye matrices and cursor.
    pub fn prepare_frame(
        &mut self,
        source: &mut dyn WindowSource,
        runtime: &mut dyn VrRuntime,
        gamepad: &GamepadSnapshot,
        now: Instant,
    ) -> FramePlan {
        let signals = self.triggers.drain_signals();
        self.pending.extend(signals);
        self.actions.update(gamepad);

        match source.geometry() {
            Ok(geometry) => self.resize.observe_window_size(geometry.width, geometry.height, now),
            Err(e) => report_capture_failure(&e),
        }
        let pointer = source.pointer();

        let samples = runtime.wait_get_poses();
        self.composer.update_poses(&samples);

        let mut recenter = self
            .actions
            .digital(RESET_ACTION)
            .is_some_and(|reset| reset.state);
        for action in std::mem::take(&mut self.pending) {
            match action {
                Action::Recenter => recenter = true,
                Action::ZoomIn | Action::ZoomOut => {
                    if let Some(delta) = action.zoom_delta() {
                        if let Err(e) = self.resize.adjust_zoom(&mut self.config.projection, delta) {
                            warn!(
                                "failed to write zoom to {}: {e}",
                                self.resize.scratch().path().display()
                            );
                        }
                    }
                }
                Action::Quit => {
                    info!("Quit requested");
                    self.quit = true;
                }
            }
        }
        self.composer.apply_head_tracking(recenter);

        let (regenerated, resized) = self.regenerate(source, now);
        let eyes = self.eye_frames(pointer);

        FramePlan {
            regenerated,
            resized,
            eyes,
        }
    }

    fn regenerate(
        &mut self,
        source: &mut dyn WindowSource,
        now: Instant,
    ) -> (Option<Regenerate>, Option<SourceFrame>) {
        let Some(reason) = self.resize.poll(now) else {
            return (None, None);
        };

        let resized = match reason {
            Regenerate::Resize => {
                let (width, height) = captured_size(source).unwrap_or_else(|| self.resize.window_size());
                Some(self.resize.apply_resize(width, height))
            }
            Regenerate::Zoom => None,
        };

        let frame = self.resize.frame();
        match mesh::generate(&self.config.projection, frame.width, frame.height) {
            Ok(mesh) => {
                self.mesh = mesh;
                (Some(reason), resized)
            }
            Err(e) => {
                warn!("keeping previous mesh: {e}");
                (None, resized)
            }
        }
    }

    fn eye_frames(&self, pointer: glam::Vec2) -> [EyeFrame; 2] {
        let projection = &self.config.projection;
        let pointer_frame = PointerFrame {
            pointer,
            window_size: self.resize.window_size(),
            arrow_image: self.arrow_image,
            arrow_size: self.mesh.cursor_scale_uniform(projection.cursor_scale, self.arrow_image),
        };

        Eye::BOTH.map(|eye| EyeFrame {
            view_projection: self.composer.view_projection(eye),
            sampling: cursor::eye_sampling(projection.view_mode, eye),
            cursor: cursor::compose(projection, eye, &pointer_frame),
        })
    }
}

/// Pixel size of what the source captures now, which can differ from the
/// window geometry (decorations, scaling).
fn captured_size(source: &mut dyn WindowSource) -> Option<(u32, u32)> {
    match source.grab() {
        Ok(image) => Some(image.dimensions()),
        Err(e) => {
            report_capture_failure(&e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectionConfig, ProjectionMode, ViewMode};
    use crate::error::PlayerError;
    use crate::hmd::DesktopHmd;
    use crate::input::ActionManifest;
    use glam::Vec2;
    use image::RgbaImage;
    use crate::triggers::SIGNAL_SLOTS;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use winit::keyboard::SmolStr;

    // Signal flags nothing raises, so frames never pick up process signals
    static NO_SIGNALS: [AtomicBool; SIGNAL_SLOTS] = [const { AtomicBool::new(false) }; SIGNAL_SLOTS];

    struct FakeWindow {
        geometry: WindowGeometry,
        /// Size of the captured image, `None` when capture fails
        grab_size: Option<(u32, u32)>,
        pointer: Vec2,
        fail_geometry: bool,
    }

    impl WindowSource for FakeWindow {
        fn geometry(&mut self) -> Result<WindowGeometry> {
            if self.fail_geometry {
                return Err(PlayerError::Capture("X Error BadWindow".into()));
            }
            Ok(self.geometry)
        }

        fn grab(&mut self) -> Result<RgbaImage> {
            match self.grab_size {
                Some((width, height)) => Ok(RgbaImage::new(width, height)),
                None => Err(PlayerError::Capture("X Error BadDrawable".into())),
            }
        }

        fn pointer(&mut self) -> Vec2 {
            self.pointer
        }
    }

    fn window(width: u32, height: u32) -> FakeWindow {
        FakeWindow {
            geometry: WindowGeometry { x: 0, y: 0, width, height },
            grab_size: Some((width, height)),
            pointer: Vec2::new(width as f32 * 0.75, height as f32 * 0.5),
            fail_geometry: false,
        }
    }

    fn context(projection: ProjectionConfig, scratch_dir: &Path, hmd: &DesktopHmd) -> AppContext {
        context_with_frame(projection, scratch_dir, hmd, (1920, 1080))
    }

    fn context_with_frame(
        projection: ProjectionConfig,
        scratch_dir: &Path,
        hmd: &DesktopHmd,
        frame_size: (u32, u32),
    ) -> AppContext {
        let manifest = ActionManifest::from_json(
            r#"{"actions": [{"name": "/actions/demo/in/HideCubes", "type": "boolean"}],
                "bindings": [{"action": "/actions/demo/in/HideCubes", "input": "South"}]}"#,
        )
        .unwrap();
        let config = AppConfig {
            projection,
            window_id: 7,
            vsync: false,
            scratch_dir: scratch_dir.to_path_buf(),
            asset_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
        };
        AppContext::new(
            config,
            hmd,
            WindowGeometry { x: 0, y: 0, width: 1920, height: 1080 },
            frame_size,
            ActionRegistry::from_manifest(&manifest).unwrap(),
            TriggerTable::standard().with_flags(&NO_SIGNALS),
            (32, 32),
        )
        .unwrap()
    }

    fn key(s: &str) -> Key {
        Key::Character(SmolStr::new(s))
    }

    #[test]
    fn zoom_key_regenerates_on_the_same_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(ProjectionConfig { zoom: 1.0, ..ProjectionConfig::default() }, dir.path(), &hmd);
        let mut source = window(1920, 1080);
        let now = Instant::now();

        assert!(ctx.handle_key(&key("e")));
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), now);
        assert_eq!(plan.regenerated, Some(Regenerate::Zoom));
        assert_eq!(plan.resized, None);
        assert!((ctx.config.projection.zoom - 1.01).abs() < 1e-9);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("vr-video-player_7")).unwrap(),
            "1.01"
        );

        let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), now);
        assert_eq!(plan.regenerated, None);
    }

    #[test]
    fn resized_source_regenerates_after_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(ProjectionConfig::default(), dir.path(), &hmd);
        let mut source = window(1280, 720);
        let pad = GamepadSnapshot::default();
        let t0 = Instant::now();

        let plan = ctx.prepare_frame(&mut source, &mut hmd, &pad, t0);
        assert_eq!(plan.regenerated, None);
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &pad, t0 + Duration::from_millis(499));
        assert_eq!(plan.regenerated, None);

        let plan = ctx.prepare_frame(&mut source, &mut hmd, &pad, t0 + Duration::from_millis(500));
        assert_eq!(plan.regenerated, Some(Regenerate::Resize));
        let frame = plan.resized.unwrap();
        assert_eq!((frame.width, frame.height), (1280, 720));
        assert_eq!(ctx.mesh().arrow_ratio, 1280.0 / 720.0);
    }

    #[test]
    fn mesh_follows_captured_size_not_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context_with_frame(ProjectionConfig::default(), dir.path(), &hmd, (1900, 1000));
        assert_eq!((ctx.resize.frame().width, ctx.resize.frame().height), (1900, 1000));
        assert_eq!(ctx.mesh().arrow_ratio, 1900.0 / 1000.0);

        let mut source = window(1280, 720);
        source.grab_size = Some((1270, 700));
        let pad = GamepadSnapshot::default();
        let t0 = Instant::now();
        ctx.prepare_frame(&mut source, &mut hmd, &pad, t0);
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &pad, t0 + Duration::from_millis(500));

        assert_eq!(plan.regenerated, Some(Regenerate::Resize));
        let frame = plan.resized.unwrap();
        assert_eq!((frame.width, frame.height), (1270, 700));
        assert_eq!(ctx.mesh().arrow_ratio, 1270.0 / 700.0);
        // the cursor still maps over the window geometry
        assert_eq!(ctx.resize.window_size(), (1280, 720));
    }

    #[test]
    fn failed_grab_on_resize_falls_back_to_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(ProjectionConfig::default(), dir.path(), &hmd);

        let mut source = window(800, 600);
        source.grab_size = None;
        let pad = GamepadSnapshot::default();
        let t0 = Instant::now();
        ctx.prepare_frame(&mut source, &mut hmd, &pad, t0);
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &pad, t0 + Duration::from_millis(600));

        let frame = plan.resized.unwrap();
        assert_eq!((frame.width, frame.height), (800, 600));
    }

    #[test]
    fn capture_race_keeps_previous_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(ProjectionConfig::default(), dir.path(), &hmd);
        let mut source = window(640, 480);
        source.fail_geometry = true;

        let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), Instant::now());
        assert_eq!(plan.regenerated, None);
        assert_eq!(ctx.resize.window_size(), (1920, 1080));
    }

    #[test]
    fn reset_action_and_key_recenter() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(
            ProjectionConfig { mode: ProjectionMode::Flat, zoom: 1.0, ..ProjectionConfig::default() },
            dir.path(),
            &hmd,
        );
        let mut source = window(1920, 1080);
        let recentered = |ctx: &AppContext, plan: &FramePlan| {
            Eye::BOTH.iter().all(|&eye| {
                let view = ctx.composer.eye(eye);
                let expected = view.projection * view.eye_to_head.inverse();
                plan.eyes[eye.index()].view_projection.abs_diff_eq(expected, 1e-4)
            })
        };

        hmd.set_look_input(Vec2::new(1.0, 0.0));
        hmd.advance(0.5);
        let held = GamepadSnapshot {
            connected: true,
            pressed: [gilrs::Button::South].into_iter().collect(),
            ..GamepadSnapshot::default()
        };
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &held, Instant::now());
        assert!(recentered(&ctx, &plan));

        // keep turning without a reset
        hmd.advance(0.5);
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), Instant::now());
        assert!(!recentered(&ctx, &plan));

        assert!(ctx.handle_key(&key("w")));
        let plan = ctx.prepare_frame(&mut source, &mut hmd, &GamepadSnapshot::default(), Instant::now());
        assert!(recentered(&ctx, &plan));
    }

    #[test]
    fn escape_quits() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(ProjectionConfig::default(), dir.path(), &hmd);
        assert!(!ctx.handle_key(&key("x")));
        assert!(ctx.handle_key(&Key::Named(winit::keyboard::NamedKey::Escape)));
        ctx.prepare_frame(&mut window(10, 10), &mut hmd, &GamepadSnapshot::default(), Instant::now());
        assert!(ctx.should_quit());
    }

    #[test]
    fn eyes_sample_their_half() {
        let dir = tempfile::tempdir().unwrap();
        let mut hmd = DesktopHmd::new((100, 100));
        let mut ctx = context(
            ProjectionConfig { view_mode: ViewMode::RightLeft, ..ProjectionConfig::default() },
            dir.path(),
            &hmd,
        );
        let plan = ctx.prepare_frame(&mut window(1920, 1080), &mut hmd, &GamepadSnapshot::default(), Instant::now());
        assert_eq!(plan.eyes[0].sampling.offset_x, 0.5);
        assert_eq!(plan.eyes[1].sampling.offset_x, 0.0);
    }
}
