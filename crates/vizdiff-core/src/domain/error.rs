//! Domain-level error taxonomy for vizdiff.

/// Errors raised while loading or validating run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("region name must not be empty (entry {index})")]
    EmptyRegionName { index: usize },

    #[error("duplicate region name: {name}")]
    DuplicateRegion { name: String },

    #[error("region {name}: clip must have a positive area, got {width}x{height}")]
    EmptyClip { name: String, width: f64, height: f64 },

    #[error("region {name}: selector must not be empty")]
    EmptySelector { name: String },

    #[error("region {name}: interaction step {step} requires a selector")]
    StepWithoutSelector { name: String, step: usize },

    #[error("region catalog must contain at least one region")]
    EmptyCatalog,

    #[error("viewport must be non-zero, got {width}x{height}@{pixel_density}")]
    InvalidViewport {
        width: u32,
        height: u32,
        pixel_density: f64,
    },

    #[error("capture target {side} must have an id and a base url")]
    InvalidTarget { side: String },

    #[error("threshold {name} is invalid: {reason}")]
    InvalidThreshold { name: String, reason: String },

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// vizdiff domain errors.
#[derive(Debug, thiserror::Error)]
pub enum VizdiffError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} timed out after {after_ms}ms")]
    NavigationTimeout { url: String, after_ms: u64 },

    #[error("region {region}: selector {selector} matched no visible element")]
    RegionNotFound { region: String, selector: String },

    #[error("region {region}: interaction step failed: {reason}")]
    Interaction { region: String, reason: String },

    #[error("image dimensions differ for region {region}: baseline {baseline:?}, candidate {candidate:?}")]
    DimensionMismatch {
        region: String,
        baseline: (u32, u32),
        candidate: (u32, u32),
    },

    #[error("renderer error: {0}")]
    Renderer(#[from] crate::renderer::RenderError),

    #[error("image store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for vizdiff domain operations.
pub type Result<T> = std::result::Result<T, VizdiffError>;
