//! Fixed-size particle buffers and the per-tick approach rule.

use crate::error::{MorphError, Result};
use crate::palette::Rgb;
use crate::shape::ShapePoint;
use glam::Vec3;
use std::time::Duration;

/// Frame length the interpolation rates are expressed against (60 Hz).
pub const REFERENCE_FRAME: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Fractions of the remaining distance covered per reference frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rates {
    /// Position fraction (α).
    pub position: f32,
    /// Color fraction (β).
    pub color: f32,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            position: 0.03,
            color: 0.02,
        }
    }
}

/// Fraction to apply for a tick of length `dt`.
///
/// Exactly `rate` for a reference frame; other frame lengths compound so the
/// approach speed does not depend on the host refresh rate.
pub fn step_fraction(rate: f32, dt: Duration) -> f32 {
    if dt == REFERENCE_FRAME {
        return rate;
    }
    let frames = dt.as_secs_f32() / REFERENCE_FRAME.as_secs_f32();
    (1.0 - (1.0 - rate).powf(frames)).clamp(0.0, 1.0)
}

/// Read-only view handed to the rasterizer.
#[derive(Clone, Copy)]
pub struct FieldSnapshot<'a> {
    pub positions: &'a [Vec3],
    pub colors: &'a [Rgb],
    pub shades: &'a [f32],
}

impl FieldSnapshot<'_> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The particle cloud. All buffers are allocated once and keep length `N`.
pub struct ParticleField {
    positions: Vec<Vec3>,
    colors: Vec<Rgb>,
    targets: Vec<Vec3>,
    shades: Vec<f32>,
    target_color: Rgb,
    rates: Rates,
}

impl ParticleField {
    /// Builds a field resting on `initial`; current and target start equal.
    pub fn new(initial: &[ShapePoint], color: Rgb, rates: Rates) -> Self {
        let positions: Vec<Vec3> = initial.iter().map(|p| p.position).collect();
        Self {
            targets: positions.clone(),
            colors: vec![color; positions.len()],
            shades: initial.iter().map(|p| p.shade).collect(),
            positions,
            target_color: color,
            rates,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn rates(&self) -> Rates {
        self.rates
    }

    pub fn target_color(&self) -> Rgb {
        self.target_color
    }

    pub fn targets(&self) -> &[Vec3] {
        &self.targets
    }

    /// Replaces every target and the shared target color.
    ///
    /// A buffer of the wrong length is rejected before anything is touched.
    pub fn set_targets(&mut self, points: &[ShapePoint], color: Rgb) -> Result<()> {
        if points.len() != self.len() {
            return Err(MorphError::ShapeMismatch {
                expected: self.len(),
                actual: points.len(),
            });
        }
        for ((t, s), p) in self.targets.iter_mut().zip(&mut self.shades).zip(points) {
            *t = p.position;
            *s = p.shade;
        }
        self.target_color = color;
        Ok(())
    }

    /// Moves every particle a fixed fraction of its remaining distance.
    pub fn advance(&mut self, dt: Duration) {
        let kp = step_fraction(self.rates.position, dt);
        let kc = step_fraction(self.rates.color, dt);
        for (p, t) in self.positions.iter_mut().zip(&self.targets) {
            *p += (*t - *p) * kp;
        }
        let tc = self.target_color;
        for c in &mut self.colors {
            *c = c.lerp(tc, kc);
        }
    }

    pub fn snapshot(&self) -> FieldSnapshot<'_> {
        FieldSnapshot {
            positions: &self.positions,
            colors: &self.colors,
            shades: &self.shades,
        }
    }

    /// Largest distance between any particle and its target.
    pub fn max_distance(&self) -> f32 {
        self.positions
            .iter()
            .zip(&self.targets)
            .map(|(p, t)| p.distance(*t))
            .fold(0.0, f32::max)
    }
}
