//! Head pose to per-eye view-projection pipeline
//!
//! The runtime hands over row-major 3x4 device poses and 4x4 projections. They
//! are converted to column-major glam matrices, the HMD pose is inverted into
//! the head (view) matrix and combined with the recenter state to produce one
//! view-projection matrix per eye.

use glam::{Mat4, Quat, Vec3, Vec4};
use log::{debug, info};

use crate::config::ProjectionMode;

/// Clip planes the eye projections are requested with
pub const NEAR_CLIP: f32 = 0.01;
pub const FAR_CLIP: f32 = 30.0;

/// Row-major 3x4 affine transform as delivered by the VR runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmdMatrix34 {
    pub m: [[f32; 4]; 3],
}

impl HmdMatrix34 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ],
    };

    pub fn to_mat4(&self) -> Mat4 {
        let m = &self.m;
        Mat4::from_cols(
            Vec4::new(m[0][0], m[1][0], m[2][0], 0.0),
            Vec4::new(m[0][1], m[1][1], m[2][1], 0.0),
            Vec4::new(m[0][2], m[1][2], m[2][2], 0.0),
            Vec4::new(m[0][3], m[1][3], m[2][3], 1.0),
        )
    }

    /// Drops the bottom row of an affine matrix.
    pub fn from_mat4(mat: &Mat4) -> Self {
        let mut m = [[0.0; 4]; 3];
        for (row, out) in m.iter_mut().enumerate() {
            for (col, value) in out.iter_mut().enumerate() {
                *value = mat.col(col)[row];
            }
        }
        Self { m }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }
}

/// Row-major 4x4 matrix as delivered by the VR runtime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HmdMatrix44 {
    pub m: [[f32; 4]; 4],
}

impl HmdMatrix44 {
    pub fn to_mat4(&self) -> Mat4 {
        let m = &self.m;
        Mat4::from_cols(
            Vec4::new(m[0][0], m[1][0], m[2][0], m[3][0]),
            Vec4::new(m[0][1], m[1][1], m[2][1], m[3][1]),
            Vec4::new(m[0][2], m[1][2], m[2][2], m[3][2]),
            Vec4::new(m[0][3], m[1][3], m[2][3], m[3][3]),
        )
    }

    pub fn from_mat4(mat: &Mat4) -> Self {
        let mut m = [[0.0; 4]; 4];
        for (row, out) in m.iter_mut().enumerate() {
            for (col, value) in out.iter_mut().enumerate() {
                *value = mat.col(col)[row];
            }
        }
        Self { m }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    GenericTracker,
    TrackingReference,
    Other,
}

impl DeviceClass {
    /// Single character used in the pose diagnostics line
    pub fn code(self) -> char {
        match self {
            DeviceClass::Invalid => 'I',
            DeviceClass::Hmd => 'H',
            DeviceClass::Controller => 'C',
            DeviceClass::GenericTracker => 'G',
            DeviceClass::TrackingReference => 'T',
            DeviceClass::Other => '?',
        }
    }
}

/// One tracked device pose for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSample {
    pub device_index: u32,
    pub class: DeviceClass,
    /// Device to absolute tracking space
    pub pose: HmdMatrix34,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Per-eye projection and eye placement, fixed for the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    pub projection: Mat4,
    pub eye_to_head: Mat4,
    head_to_eye: Mat4,
}

impl EyeView {
    pub fn new(projection: &HmdMatrix44, eye_to_head: &HmdMatrix34) -> Self {
        let eye_to_head = eye_to_head.to_mat4();
        Self {
            projection: projection.to_mat4(),
            eye_to_head,
            head_to_eye: eye_to_head.inverse(),
        }
    }

    pub fn head_to_eye(&self) -> Mat4 {
        self.head_to_eye
    }
}

/// Head transforms carried from frame to frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionState {
    /// Inverse of the HMD device pose
    pub head_pose: Mat4,
    /// Position the scene is anchored to
    pub head_position: Vec3,
    pub head_rotation: Quat,
    /// Only changes on recenter
    pub recenter_rotation: Quat,
    /// HMD position reported this frame
    pub live_position: Vec3,
}

impl Default for CompositionState {
    fn default() -> Self {
        Self {
            head_pose: Mat4::IDENTITY,
            head_position: Vec3::ZERO,
            head_rotation: Quat::IDENTITY,
            recenter_rotation: Quat::IDENTITY,
            live_position: Vec3::ZERO,
        }
    }
}

/// Which devices had valid poses this frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoseSummary {
    pub valid_count: usize,
    pub classes: String,
    pub controller_count: usize,
}

pub struct ViewComposer {
    mode: ProjectionMode,
    eyes: [EyeView; 2],
    state: CompositionState,
    last_summary: Option<PoseSummary>,
}

impl ViewComposer {
    pub fn new(mode: ProjectionMode, left: EyeView, right: EyeView) -> Self {
        Self {
            mode,
            eyes: [left, right],
            state: CompositionState::default(),
            last_summary: None,
        }
    }

    pub fn state(&self) -> &CompositionState {
        &self.state
    }

    pub fn eye(&self, eye: Eye) -> &EyeView {
        &self.eyes[eye.index()]
    }

    /// Take this frame's device poses. Returns the summary, which is also
    /// logged whenever it differs from the previous frame.
    pub fn update_poses(&mut self, samples: &[TrackingSample]) -> PoseSummary {
        let mut summary = PoseSummary::default();

        for sample in samples.iter().filter(|s| s.valid) {
            summary.valid_count += 1;
            summary.classes.push(sample.class.code());

            match sample.class {
                DeviceClass::Hmd => {
                    let device_pose = sample.pose.to_mat4();
                    self.state.live_position = sample.pose.translation();
                    self.state.head_pose = device_pose.inverse();
                    self.state.head_rotation = Quat::from_mat4(&self.state.head_pose).normalize();
                }
                DeviceClass::Controller => summary.controller_count += 1,
                _ => {}
            }
        }

        if self.last_summary.as_ref() != Some(&summary) {
            info!(
                "PoseCount:{}({}) Controllers:{}",
                summary.valid_count, summary.classes, summary.controller_count
            );
            self.last_summary = Some(summary.clone());
        }

        summary
    }

    /// Make the current head orientation and position the new forward/origin.
    pub fn recenter(&mut self) {
        self.state.head_position = self.state.live_position;
        self.state.recenter_rotation = self.state.head_rotation.inverse();
        info!("reset rotation");
    }

    /// Apply this frame's recenter request. The sphere stays attached to the
    /// head, so it tracks the live position every frame.
    pub fn apply_head_tracking(&mut self, recenter: bool) {
        if recenter {
            self.recenter();
        }
        if self.mode == ProjectionMode::Sphere {
            self.state.head_position = self.state.live_position;
        }
    }

    /// Head pose with the anchor translation and recenter rotation applied
    pub fn head_transform(&self) -> Mat4 {
        let state = &self.state;
        state.head_pose
            * Mat4::from_translation(state.head_position)
            * Mat4::from_quat(state.recenter_rotation)
    }

    pub fn view_projection(&self, eye: Eye) -> Mat4 {
        let view = self.eye(eye);
        let matrix = view.projection * view.head_to_eye() * self.head_transform();
        debug!("{eye:?} view projection {matrix:?}");
        matrix
    }
}
