//! VR runtime access
//!
//! `VrRuntime` is what the player needs from a headset runtime: per-eye
//! projections and eye placement, tracked device poses each frame and a place
//! to hand finished eye images to. `DesktopHmd` emulates a seated headset on
//! the desktop: gamepad look input plus a gentle simulated head motion, with
//! the eyes shown side by side in the companion window.

use std::time::Instant;

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4};
use log::info;

use crate::pose::{DeviceClass, Eye, HmdMatrix34, HmdMatrix44, TrackingSample};

pub trait VrRuntime {
    /// Per-eye render target size
    fn recommended_render_target_size(&self) -> (u32, u32);

    /// Row-major projection for `eye`
    fn projection_matrix(&self, eye: Eye, near: f32, far: f32) -> HmdMatrix44;

    /// Row-major eye to head transform for `eye`
    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34;

    /// Block until the next frame and return the pose of every tracked device
    fn wait_get_poses(&mut self) -> Vec<TrackingSample>;

    /// Hand over the finished image for `eye`
    fn submit(&mut self, eye: Eye);
}

/// Emulated headset
pub struct DesktopHmd {
    render_size: (u32, u32),
    last_update: Instant,
    time: f32,
    yaw: f32,
    pitch: f32,
    look: Vec2,
    orientation: Quat,
    position: Vec3,
    frames_submitted: [u64; 2],
}

impl DesktopHmd {
    // Inter-pupillary distance (average human IPD is ~63mm)
    pub const IPD: f32 = 0.063;
    const FOV_Y_DEGREES: f32 = 90.0;
    // Radians per second at full stick deflection
    const LOOK_SPEED: f32 = 1.5;
    const PITCH_LIMIT: f32 = 1.4;

    pub fn new(render_size: (u32, u32)) -> Self {
        info!(
            "Desktop HMD emulation, {}x{} per eye",
            render_size.0, render_size.1
        );
        Self {
            render_size: (render_size.0.max(1), render_size.1.max(1)),
            last_update: Instant::now(),
            time: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            look: Vec2::ZERO,
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            frames_submitted: [0; 2],
        }
    }

    /// Stick deflection turning the emulated head, right and up positive
    pub fn set_look_input(&mut self, look: Vec2) {
        self.look = look.clamp(Vec2::splat(-1.0), Vec2::splat(1.0));
    }

    pub fn frames_submitted(&self, eye: Eye) -> u64 {
        self.frames_submitted[eye.index()]
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Move the emulated head forward by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.time += dt;
        self.yaw -= self.look.x * Self::LOOK_SPEED * dt;
        self.pitch = (self.pitch + self.look.y * Self::LOOK_SPEED * dt)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);

        let breathing = (self.time * 0.5).sin() * 0.01;
        let sway = (self.time * 0.3).sin() * 0.005;
        self.orientation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch + breathing, sway);
        self.position = Vec3::new(0.0, breathing * 0.2, 0.0);
    }

    fn hmd_sample(&self) -> TrackingSample {
        let pose = Mat4::from_rotation_translation(self.orientation, self.position);
        TrackingSample {
            device_index: 0,
            class: DeviceClass::Hmd,
            pose: HmdMatrix34::from_mat4(&pose),
            valid: true,
        }
    }
}

impl VrRuntime for DesktopHmd {
    fn recommended_render_target_size(&self) -> (u32, u32) {
        self.render_size
    }

    fn projection_matrix(&self, _eye: Eye, near: f32, far: f32) -> HmdMatrix44 {
        let (width, height) = self.render_size;
        let aspect = width as f32 / height as f32;

        let top = near * (Self::FOV_Y_DEGREES.to_radians() / 2.0).tan();
        let bottom = -top;
        let right = top * aspect;
        let left = -right;

        let x_scale = 2.0 * near / (right - left);
        let y_scale = 2.0 * near / (top - bottom);
        let x_offset = (right + left) / (right - left);
        let y_offset = (top + bottom) / (top - bottom);
        // depth maps to [0, 1]
        let z_scale = far / (near - far);
        let z_offset = near * far / (near - far);

        let projection = Mat4::from_cols(
            Vec4::new(x_scale, 0.0, 0.0, 0.0),
            Vec4::new(0.0, y_scale, 0.0, 0.0),
            Vec4::new(x_offset, y_offset, z_scale, -1.0),
            Vec4::new(0.0, 0.0, z_offset, 0.0),
        );
        HmdMatrix44::from_mat4(&projection)
    }

    fn eye_to_head_transform(&self, eye: Eye) -> HmdMatrix34 {
        let offset = match eye {
            Eye::Left => -Self::IPD / 2.0,
            Eye::Right => Self::IPD / 2.0,
        };
        HmdMatrix34::from_mat4(&Mat4::from_translation(Vec3::new(offset, 0.0, 0.0)))
    }

    fn wait_get_poses(&mut self) -> Vec<TrackingSample> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;
        self.advance(dt);
        vec![self.hmd_sample()]
    }

    fn submit(&mut self, eye: Eye) {
        self.frames_submitted[eye.index()] += 1;
    }
}
