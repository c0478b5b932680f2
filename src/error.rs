//! Error types for the player.
//!
//! Startup failures bubble up to `main` as a `PlayerError` and end the
//! process with a non-zero status. Per-frame code logs and carries on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// No capturable window matches the requested id
    #[error("window {0:#x} not found")]
    WindowNotFound(u64),

    /// Source frame dimensions the mesh generator cannot work with
    #[error("invalid source size {width}x{height}: height must be non-zero")]
    InvalidSourceSize { width: u32, height: u32 },

    /// Window capture backend failure
    #[error("capture failed: {0}")]
    Capture(String),

    /// Required asset missing from every search location
    #[error("unable to find {name} (searched {searched:?})")]
    AssetNotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid action manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Action manifest references an unknown binding or duplicate action
    #[error("invalid action binding: {0}")]
    Binding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Adapter, device or surface acquisition failed
    #[error("GPU initialization failed: {0}")]
    Gpu(String),

    /// Shader module or pipeline rejected by validation
    #[error("shader setup failed for {label}: {message}")]
    Shader { label: &'static str, message: String },

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create companion window: {0}")]
    Window(#[from] winit::error::OsError),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
