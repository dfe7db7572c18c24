//! Procedural point clouds.
//!
//! A shape is a [`Recipe`]: an ordered list of weighted [`Band`]s. The index
//! range `[0, count)` is cut into contiguous bands by cumulative weight and
//! each band places its particles with its own formula. Particle `k` of the
//! output lands on particle `k` of the field, so index order is the only
//! correspondence between two shapes.

use crate::error::{MorphError, Result};
use glam::Vec3;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeId {
    Random,
    Plow,
    Ship,
    Train,
    Sphere,
    Ring,
    Lattice,
}

impl ShapeId {
    pub const ALL: [ShapeId; 7] = [
        ShapeId::Random,
        ShapeId::Plow,
        ShapeId::Ship,
        ShapeId::Train,
        ShapeId::Sphere,
        ShapeId::Ring,
        ShapeId::Lattice,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShapeId::Random => "random",
            ShapeId::Plow => "plow",
            ShapeId::Ship => "ship",
            ShapeId::Train => "train",
            ShapeId::Sphere => "sphere",
            ShapeId::Ring => "ring",
            ShapeId::Lattice => "lattice",
        }
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shape `{0}`")]
pub struct ParseShapeError(String);

impl FromStr for ShapeId {
    type Err = ParseShapeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ShapeId::ALL
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| ParseShapeError(s.to_string()))
    }
}

/// One generated particle: where it goes and how bright it should read
/// relative to the era color (`0..=1`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapePoint {
    pub position: Vec3,
    pub shade: f32,
}

impl ShapePoint {
    pub fn new(position: Vec3, shade: f32) -> Self {
        Self { position, shade }
    }
}

/// Position of a particle inside its band.
#[derive(Clone, Copy, Debug)]
pub struct Slot {
    /// Index relative to the start of the band.
    pub local: usize,
    /// Number of particles in the band.
    pub len: usize,
}

impl Slot {
    /// `local / len`, in `[0, 1)`.
    pub fn t(self) -> f32 {
        if self.len == 0 {
            0.0
        } else {
            self.local as f32 / self.len as f32
        }
    }
}

pub type Placer = fn(&mut dyn RngCore, Slot) -> ShapePoint;

#[derive(Clone, Copy)]
pub struct Band {
    pub weight: f32,
    pub place: Placer,
}

/// Weighted sub-regions making up one shape.
#[derive(Clone)]
pub struct Recipe {
    bands: Vec<Band>,
}

impl Recipe {
    pub fn new(weight: f32, place: Placer) -> Self {
        Self {
            bands: vec![Band { weight, place }],
        }
    }

    pub fn band(mut self, weight: f32, place: Placer) -> Self {
        self.bands.push(Band { weight, place });
        self
    }

    pub fn weights(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.weight).collect()
    }
}

/// Splits `[0, count)` into one contiguous range per weight.
///
/// Ranges are in input order, adjacent, and cover every index exactly once.
/// Negative weights count as zero; if nothing is positive the bands share
/// the range evenly.
pub fn band_ranges(weights: &[f32], count: usize) -> Vec<Range<usize>> {
    if weights.is_empty() {
        return Vec::new();
    }
    let mut w: Vec<f64> = weights.iter().map(|&x| x.max(0.0) as f64).collect();
    let mut total: f64 = w.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        w.iter_mut().for_each(|x| *x = 1.0);
        total = w.len() as f64;
    }

    let mut out = Vec::with_capacity(w.len());
    let mut start = 0usize;
    let mut cum = 0.0f64;
    for (k, wk) in w.iter().enumerate() {
        cum += wk;
        let end = if k + 1 == w.len() {
            count
        } else {
            ((count as f64 * cum / total).round() as usize).clamp(start, count)
        };
        out.push(start..end);
        start = end;
    }
    out
}

/// Registry mapping shape ids to recipes.
#[derive(Clone, Default)]
pub struct ShapeGenerator {
    recipes: HashMap<ShapeId, Recipe>,
}

impl ShapeGenerator {
    /// A registry with no shapes; every `generate` fails until something is
    /// registered.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut g = Self::empty();
        g.register(ShapeId::Random, Recipe::new(1.0, place_random));
        g.register(
            ShapeId::Plow,
            Recipe::new(0.7, place_plow_blade).band(0.3, place_plow_handle),
        );
        g.register(
            ShapeId::Ship,
            Recipe::new(0.8, place_ship_hull).band(0.2, place_ship_mast),
        );
        g.register(
            ShapeId::Train,
            Recipe::new(0.2, place_train_wheels).band(0.8, place_train_body),
        );
        g.register(ShapeId::Sphere, Recipe::new(1.0, place_sphere));
        g.register(
            ShapeId::Ring,
            Recipe::new(0.25, place_ring_core).band(0.75, place_ring_band),
        );
        g.register(ShapeId::Lattice, Recipe::new(1.0, place_lattice));
        g
    }

    pub fn register(&mut self, id: ShapeId, recipe: Recipe) -> Option<Recipe> {
        self.recipes.insert(id, recipe)
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.recipes.contains_key(&id)
    }

    /// Produces exactly `count` points for `id`.
    pub fn generate(
        &self,
        id: ShapeId,
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ShapePoint>> {
        let recipe = self.recipes.get(&id).ok_or(MorphError::UnknownShapeId(id))?;
        let mut out = Vec::with_capacity(count);
        for (band, range) in recipe.bands.iter().zip(band_ranges(&recipe.weights(), count)) {
            let len = range.len();
            for local in 0..len {
                out.push((band.place)(rng, Slot { local, len }));
            }
        }
        debug_assert_eq!(out.len(), count);
        Ok(out)
    }
}

fn centered(rng: &mut dyn RngCore, span: f32) -> f32 {
    (rng.gen::<f32>() - 0.5) * span
}

fn place_random(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let r = 5.0 * rng.gen::<f32>();
    let theta = rng.gen::<f32>() * TAU;
    let phi = rng.gen::<f32>() * PI;
    let p = Vec3::new(
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    );
    ShapePoint::new(p, 1.0 - 0.5 * (r / 5.0))
}

fn place_plow_blade(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let x = centered(rng, 2.0);
    let z = centered(rng, 4.0);
    ShapePoint::new(Vec3::new(x, x.abs() * 0.5 - 1.0, z), 0.9)
}

fn place_plow_handle(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let y = rng.gen::<f32>() * 2.0 - 1.0;
    let z = 1.0 + rng.gen::<f32>();
    ShapePoint::new(Vec3::new(0.0, y, z), 0.7)
}

fn place_ship_hull(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let u = rng.gen::<f32>() * PI;
    let v = rng.gen::<f32>() * TAU;
    let x = 3.0 * u.cos() * v.sin();
    // flat deck
    let y = (-1.0 + v.cos()).min(0.0);
    let z = 1.5 * u.sin() * v.sin();
    ShapePoint::new(Vec3::new(x, y, z), 0.85)
}

fn place_ship_mast(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    ShapePoint::new(Vec3::new(0.0, rng.gen::<f32>() * 3.0, 0.0), 1.0)
}

fn place_train_wheels(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let x = centered(rng, 3.0);
    let z = if rng.gen::<bool>() { 0.5 } else { -0.5 };
    ShapePoint::new(Vec3::new(x, -1.0, z), 0.6)
}

fn place_train_body(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let p = Vec3::new(centered(rng, 4.0), centered(rng, 1.5), centered(rng, 1.5));
    ShapePoint::new(p, 0.9)
}

fn place_sphere(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let r = 2.5;
    let theta = rng.gen::<f32>() * TAU;
    let phi = (2.0 * rng.gen::<f32>() - 1.0).acos();
    let p = Vec3::new(
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    );
    // front hemisphere reads brighter
    ShapePoint::new(p, 0.7 + 0.3 * (p.z / r + 1.0) * 0.5)
}

fn place_ring_core(rng: &mut dyn RngCore, _: Slot) -> ShapePoint {
    let r = 0.9 * rng.gen::<f32>().sqrt();
    let a = rng.gen::<f32>() * TAU;
    ShapePoint::new(Vec3::new(r * a.cos(), r * a.sin(), centered(rng, 0.1)), 1.0)
}

fn place_ring_band(rng: &mut dyn RngCore, slot: Slot) -> ShapePoint {
    // evenly spaced angles, jittered radius
    let a = slot.t() * TAU + centered(rng, 0.02);
    let r = 2.4 + centered(rng, 0.4);
    ShapePoint::new(Vec3::new(r * a.cos(), r * a.sin(), centered(rng, 0.1)), 0.8)
}

fn place_lattice(rng: &mut dyn RngCore, slot: Slot) -> ShapePoint {
    let side = (slot.len as f32).sqrt().ceil().max(1.0) as usize;
    let row = slot.local / side;
    let col = slot.local % side;
    let span = (side.saturating_sub(1)).max(1) as f32;
    let x = (col as f32 / span - 0.5) * 5.0;
    let y = (row as f32 / span - 0.5) * 5.0;
    let z = (x * 1.3).sin() * 0.3 + centered(rng, 0.02);
    let shade = if row % 4 == 0 || col % 4 == 0 { 1.0 } else { 0.6 };
    ShapePoint::new(Vec3::new(x, y, z), shade)
}
