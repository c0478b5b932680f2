//! Projection mesh generation
//!
//! Builds the triangle list the captured window is drawn onto. Every mode
//! produces an unindexed list (three vertices per triangle) and the mesh is
//! always rebuilt from scratch, never patched.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::config::{ProjectionConfig, ProjectionMode};
use crate::error::{PlayerError, Result};

// Truncated pi, kept so the sphere seam lands where users are used to it.
const SPHERE_ANGLE: f64 = 3.14;
const SPHERE_ROWS: u32 = 32;
const SPHERE_COLUMNS: u32 = 32;
const SPHERE_RADIUS_HEIGHT: f64 = 0.5;

const CYLINDER_COLUMNS: u32 = 64;
const CYLINDER_ANGLE_START: f64 = -0.8;
const CYLINDER_ANGLE_END: f64 = 0.8;
const CYLINDER_HEIGHT: f64 = 1.5;
const CYLINDER_DEPTH_SCALE: f64 = 0.75;

const FLAT_HEIGHT: f64 = 0.5;

/// Vertex layout shared with `shaders/scene.wgsl`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl SceneVertex {
    fn new(x: f64, y: f64, z: f64, u: f64, v: f64) -> Self {
        Self {
            position: [x as f32, y as f32, z as f32],
            uv: [u as f32, v as f32],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMesh {
    pub vertices: Vec<SceneVertex>,
    /// Horizontal stretch the cursor arrow needs to keep its shape on this surface
    pub arrow_ratio: f64,
}

impl ProjectionMesh {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// Arrow size in texture space for the given cursor scale and arrow image size.
    pub fn cursor_scale_uniform(&self, cursor_scale: f32, arrow_image: (u32, u32)) -> Vec2 {
        cursor_scale_uniform(cursor_scale, self.arrow_ratio, arrow_image)
    }
}

/// Build the mesh for `config` and a source frame of `width` x `height` pixels.
pub fn generate(config: &ProjectionConfig, width: u32, height: u32) -> Result<ProjectionMesh> {
    if height == 0 {
        return Err(PlayerError::InvalidSourceSize { width, height });
    }
    let aspect_ratio = width as f64 / height as f64;

    let mesh = match config.mode {
        ProjectionMode::Sphere => ProjectionMesh {
            vertices: sphere(aspect_ratio, config.zoom),
            arrow_ratio: aspect_ratio,
        },
        ProjectionMode::Cylinder => ProjectionMesh {
            vertices: cylinder(aspect_ratio, config.zoom),
            arrow_ratio: aspect_ratio,
        },
        ProjectionMode::Flat => ProjectionMesh {
            vertices: flat(aspect_ratio, config.zoom, config.stretch),
            // each eye sees half the texture across a quad sized for the whole of it
            arrow_ratio: if config.stretch { aspect_ratio * 2.0 } else { aspect_ratio },
        },
    };

    Ok(mesh)
}

/// `x = 0.01 * cursor_scale`, `y` keeps the arrow image's aspect on the surface.
pub fn cursor_scale_uniform(cursor_scale: f32, arrow_ratio: f64, arrow_image: (u32, u32)) -> Vec2 {
    let (arrow_width, arrow_height) = arrow_image;
    let x = 0.01 * cursor_scale;
    let image_ratio = if arrow_width == 0 {
        0.0
    } else {
        arrow_height as f32 / arrow_width as f32
    };
    Vec2::new(x, x * arrow_ratio as f32 * image_ratio)
}

fn sphere(aspect_ratio: f64, zoom: f64) -> Vec<SceneVertex> {
    let rows = SPHERE_ROWS as f64;
    let columns = SPHERE_COLUMNS as f64;
    let radius = SPHERE_RADIUS_HEIGHT * aspect_ratio * 0.5;

    let mut vertices = Vec::with_capacity((SPHERE_ROWS * SPHERE_COLUMNS * 6) as usize);

    for row in 0..SPHERE_ROWS {
        let v1 = row as f64 / rows;
        let v2 = (row + 1) as f64 / rows;
        let ring1 = (v1 * SPHERE_ANGLE).sin();
        let ring2 = (v2 * SPHERE_ANGLE).sin();
        let y1 = (v1 * SPHERE_ANGLE).cos() * SPHERE_RADIUS_HEIGHT;
        let y2 = (v2 * SPHERE_ANGLE).cos() * SPHERE_RADIUS_HEIGHT;

        for column in 0..SPHERE_COLUMNS {
            let t1 = column as f64 / columns;
            let t2 = (column + 1) as f64 / columns;
            let (sin1, cos1) = (t1 * SPHERE_ANGLE).sin_cos();
            let (sin2, cos2) = (t2 * SPHERE_ANGLE).sin_cos();

            let point = |sin: f64, cos: f64, ring: f64, y: f64, u: f64, v: f64| {
                SceneVertex::new(-cos * radius * ring, y, sin * radius * ring + zoom, 1.0 - u, v)
            };

            vertices.push(point(sin1, cos1, ring1, y1, t1, v1));
            vertices.push(point(sin2, cos2, ring1, y1, t2, v1));
            vertices.push(point(sin1, cos1, ring2, y2, t1, v2));

            vertices.push(point(sin1, cos1, ring2, y2, t1, v2));
            vertices.push(point(sin2, cos2, ring2, y2, t2, v2));
            vertices.push(point(sin2, cos2, ring1, y1, t2, v1));
        }
    }

    vertices
}

fn cylinder(aspect_ratio: f64, zoom: f64) -> Vec<SceneVertex> {
    let columns = CYLINDER_COLUMNS as f64;
    let angle_len = CYLINDER_ANGLE_END - CYLINDER_ANGLE_START;

    // chord across the arc matches the width the window wants at this height
    let width_start = CYLINDER_ANGLE_START.sin();
    let width_end = (CYLINDER_ANGLE_START + angle_len).sin();
    let target_radius = CYLINDER_HEIGHT * aspect_ratio;
    let radius = 2.0 * (target_radius / (width_end - width_start));

    let mut vertices = Vec::with_capacity((CYLINDER_COLUMNS * 6) as usize);

    for column in 0..CYLINDER_COLUMNS {
        let t1 = column as f64 / columns;
        let t2 = (column + 1) as f64 / columns;
        let (sin1, cos1) = (CYLINDER_ANGLE_START + t1 * angle_len).sin_cos();
        let (sin2, cos2) = (CYLINDER_ANGLE_START + t2 * angle_len).sin_cos();

        let x1 = sin1 * radius;
        let z1 = zoom + cos1 * radius * CYLINDER_DEPTH_SCALE;
        let x2 = sin2 * radius;
        let z2 = zoom + cos2 * radius * CYLINDER_DEPTH_SCALE;

        vertices.push(SceneVertex::new(x1, CYLINDER_HEIGHT, z1, 1.0 - t1, 0.0));
        vertices.push(SceneVertex::new(x2, CYLINDER_HEIGHT, z2, 1.0 - t2, 0.0));
        vertices.push(SceneVertex::new(x1, -CYLINDER_HEIGHT, z1, 1.0 - t1, 1.0));

        vertices.push(SceneVertex::new(x1, -CYLINDER_HEIGHT, z1, 1.0 - t1, 1.0));
        vertices.push(SceneVertex::new(x2, CYLINDER_HEIGHT, z2, 1.0 - t2, 0.0));
        vertices.push(SceneVertex::new(x2, -CYLINDER_HEIGHT, z2, 1.0 - t2, 1.0));
    }

    vertices
}

fn flat(aspect_ratio: f64, zoom: f64, stretch: bool) -> Vec<SceneVertex> {
    let height = FLAT_HEIGHT;
    let width = flat_half_width(aspect_ratio, stretch);

    vec![
        SceneVertex::new(-width, height, zoom, 1.0, 0.0),
        SceneVertex::new(width, height, zoom, 0.0, 0.0),
        SceneVertex::new(-width, -height, zoom, 1.0, 1.0),
        SceneVertex::new(-width, -height, zoom, 1.0, 1.0),
        SceneVertex::new(width, -height, zoom, 0.0, 1.0),
        SceneVertex::new(width, height, zoom, 0.0, 0.0),
    ]
}

fn flat_half_width(aspect_ratio: f64, stretch: bool) -> f64 {
    FLAT_HEIGHT * if stretch { 1.0 } else { 0.5 } * aspect_ratio
}
