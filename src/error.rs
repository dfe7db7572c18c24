//! Error types for the morphing engine.
//!
//! Every error here is local and recoverable: the scene keeps rendering its
//! last good state and the render loop never unwinds because of one.

use crate::shape::ShapeId;

/// Errors raised by the shape generator, particle field, scheduler and
/// scene configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MorphError {
    /// A target buffer did not match the field's particle count.
    #[error("target buffer holds {actual} particles, field holds {expected}")]
    ShapeMismatch {
        /// Particle count of the field.
        expected: usize,
        /// Length of the rejected buffer.
        actual: usize,
    },

    /// No generator is registered for the requested shape.
    #[error("no generator registered for shape `{0}`")]
    UnknownShapeId(ShapeId),

    /// A manual jump named an era outside the era list.
    #[error("era index {index} out of range (0..{len})")]
    InvalidIndex {
        /// Requested index.
        index: usize,
        /// Number of eras.
        len: usize,
    },

    /// A scene was configured without any eras.
    #[error("era list is empty")]
    EmptyEraList,

    /// An interpolation rate fell outside `(0, 1]`.
    #[error("{name} must be in (0, 1], got {value}")]
    InvalidRate {
        /// Which rate.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },

    /// The particle count was above what a scene will allocate.
    #[error("particle count {value} exceeds the maximum of {max}")]
    InvalidParticleCount {
        /// Requested count.
        value: usize,
        /// Largest accepted count.
        max: usize,
    },

    /// A duration that must be positive was zero.
    #[error("{name} must be greater than zero")]
    InvalidDuration {
        /// Which duration.
        name: &'static str,
    },
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, MorphError>;
