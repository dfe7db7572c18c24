//! Particle morphing engine: a fixed-size cloud of points that drifts from
//! one procedurally generated shape to the next as a scene steps through a
//! sequence of eras.

pub mod era;
pub mod error;
pub mod field;
pub mod palette;
pub mod scene;
pub mod scheduler;
pub mod shape;

pub use era::{default_eras, Era};
pub use error::{MorphError, Result};
pub use field::{ParticleField, Rates, REFERENCE_FRAME};
pub use palette::Rgb;
pub use scene::{Scene, SceneConfig, Surface, Viewport, MAX_PARTICLES};
pub use scheduler::{CaptionSink, EraNotice, EraScheduler, NullSink, Phase, Timing};
pub use shape::{ShapeGenerator, ShapeId, ShapePoint};
