//! vr-video-player - view a desktop window in VR
//!
//! The source X11 window is captured every frame and drawn onto a sphere,
//! cylinder or flat surface in front of the viewer, one half per eye for side
//! by side stereo content. A companion window on the desktop shows both eyes.

use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

pub mod assets;
pub mod capture;
pub mod config;
pub mod context;
pub mod cursor;
pub mod error;
pub mod hmd;
pub mod input;
pub mod mesh;
pub mod pose;
pub mod renderer;
pub mod resize;
pub mod triggers;

use capture::{report_capture_failure, WindowSource, XcapWindowSource};
use config::AppConfig;
use context::AppContext;
use error::{PlayerError, Result};
use hmd::{DesktopHmd, VrRuntime};
use input::{ActionManifest, ActionRegistry, GamepadInput};
use pose::Eye;
use renderer::Renderer;
use triggers::TriggerTable;

/// Per-eye render size of the emulated headset
pub const DEFAULT_EYE_SIZE: (u32, u32) = (1080, 1200);

const COMPANION_TITLE: &str = "vr-video-player";
const COMPANION_SIZE: (u32, u32) = (1280, 720);

/// Main application state
struct VrPlayer {
    context: AppContext,
    source: XcapWindowSource,
    hmd: DesktopHmd,
    gamepad: GamepadInput,
    arrow: image::RgbaImage,

    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    last_frame_time: Instant,
    /// First fatal error, returned from `run` once the loop exits
    failure: Option<PlayerError>,
}

impl VrPlayer {
    fn init_renderer(&self, event_loop: &ActiveEventLoop) -> Result<(Arc<Window>, Renderer)> {
        let window_attrs = Window::default_attributes()
            .with_title(COMPANION_TITLE)
            .with_inner_size(LogicalSize::new(COMPANION_SIZE.0, COMPANION_SIZE.1));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let renderer = pollster::block_on(Renderer::new(
            window.clone(),
            self.hmd.recommended_render_target_size(),
            self.context.config.vsync,
            &self.arrow,
            self.context.resize.frame(),
            self.context.mesh(),
        ))?;
        Ok((window, renderer))
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: PlayerError) {
        error!("{err}");
        self.failure.get_or_insert(err);
        event_loop.exit();
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        log::trace!("frame time {:.2} ms", dt * 1000.0);

        let gamepad = self.gamepad.update().clone();
        self.hmd.set_look_input(gamepad.right_stick);

        let plan = self
            .context
            .prepare_frame(&mut self.source, &mut self.hmd, &gamepad, now);
        if self.context.should_quit() {
            event_loop.exit();
            return;
        }

        let Some(renderer) = &mut self.renderer else {
            return;
        };
        if let Some(frame) = plan.resized {
            renderer.resize_capture(frame);
        }
        if plan.regenerated.is_some() {
            renderer.set_mesh(self.context.mesh());
        }

        match self.source.grab() {
            Ok(image) => {
                renderer.upload_capture(&image, self.context.resize.frame().generation);
            }
            Err(e) => report_capture_failure(&e),
        }

        renderer.render_eyes(&plan.eyes);
        for eye in Eye::BOTH {
            self.hmd.submit(eye);
        }
        renderer.present_companion();

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler for VrPlayer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        info!("Creating companion window");

        match self.init_renderer(event_loop) {
            Ok((window, renderer)) => {
                info!("Renderer initialized");
                window.request_redraw();
                self.window = Some(window);
                self.renderer = Some(renderer);
                self.last_frame_time = Instant::now();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = &mut self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    self.context.handle_key(&event.logical_key);
                }
            }
            WindowEvent::RedrawRequested => self.frame(event_loop),
            _ => {}
        }
    }
}

/// Set everything up and run until quit, close or a fatal error.
pub fn run(config: AppConfig) -> Result<()> {
    let triggers = TriggerTable::standard();
    triggers.install_signal_handlers()?;

    let arrow = assets::load_arrow_image(&config.asset_dir)?;
    let manifest_path = assets::action_manifest_path(&config.asset_dir)?;
    let actions = ActionRegistry::from_manifest(&ActionManifest::load(&manifest_path)?)?;
    info!("Loaded action manifest {}", manifest_path.display());

    let mut source = XcapWindowSource::open(config.window_id)?;
    let geometry = source.geometry()?;
    let first_frame = source.grab()?;
    info!(
        "Window geometry {}x{}, captured frame {}x{}",
        geometry.width,
        geometry.height,
        first_frame.width(),
        first_frame.height()
    );

    let hmd = DesktopHmd::new(DEFAULT_EYE_SIZE);
    let context = AppContext::new(
        config,
        &hmd,
        geometry,
        first_frame.dimensions(),
        actions,
        triggers,
        arrow.dimensions(),
    )?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut player = VrPlayer {
        context,
        source,
        hmd,
        gamepad: GamepadInput::new(),
        arrow,
        window: None,
        renderer: None,
        last_frame_time: Instant::now(),
        failure: None,
    };
    event_loop.run_app(&mut player)?;
    info!("Shutting down");

    match player.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
