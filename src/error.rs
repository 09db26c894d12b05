//! Error types for rendering, configuration and parameter handling.
//!
//! Only misconfiguration surfaces here. Per-lane numerical failures (zero pdfs,
//! missed intersections, underflowed throughput) are absorbed by the lane masks
//! and never become errors.

/// Errors raised before any ray is traced.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("scene contains no shapes")]
    EmptyScene,

    #[error("scene contains no emitter that can emit particles")]
    NoParticleEmitter,

    #[error("scene has no sensor")]
    MissingSensor,

    #[error("image size mismatch: expected {expected} values, got {got}")]
    ImageSize { expected: usize, got: usize },

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl RenderError {
    /// Convenience constructor for configuration errors.
    pub fn config<T: ToString>(msg: T) -> Self {
        RenderError::InvalidConfig(msg.to_string())
    }
}

/// Errors raised by the parameter record and the optimizers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("parameter '{key}' expects {expected} values, got {got}")]
    LengthMismatch {
        key: String,
        expected: usize,
        got: usize,
    },

    #[error("cannot track {requested} differentiable scalars, capacity is {capacity}")]
    TangentCapacity { requested: usize, capacity: usize },

    #[error("no gradient has been evaluated for parameter '{0}'")]
    MissingGradient(String),

    #[error("learning rate must be positive and finite, got {0}")]
    NonPositiveLearningRate(f32),

    #[error("invalid hyperparameter {name} = {value}")]
    InvalidHyperparameter { name: &'static str, value: f32 },
}

/// Result type alias for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type alias for parameter operations.
pub type ParamResult<T> = Result<T, ParamError>;
