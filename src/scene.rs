//! One mounted morphing scene: the particle field, its scheduler, the camera
//! and the accent orb, behind a `create` / `tick` / `render` / `dispose`
//! lifecycle.

use crate::era::{default_eras, Era};
use crate::error::{MorphError, Result};
use crate::field::{ParticleField, Rates};
use crate::palette::Rgb;
use crate::scheduler::{CaptionSink, EraScheduler, Timing};
use crate::shape::{ShapeGenerator, ShapePoint};
use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;
use tracing::info;

/// Longest step a single tick may integrate; a stalled host does not make
/// the cloud jump.
pub const MAX_STEP: Duration = Duration::from_millis(100);

/// Cloud spin about the y axis, radians per second.
const SPIN_RATE: f32 = 0.06;
/// Orb orbit speed, radians per second.
const ORB_RATE: f32 = 0.5;
const ORB_RADIUS: f32 = 0.5;

/// Largest cloud a scene will allocate.
pub const MAX_PARTICLES: usize = 1_000_000;

/// Anything the scene can be rasterized into.
pub trait Surface {
    /// Width and height in pixels.
    fn size(&self) -> (u32, u32);
    /// Adds `color * intensity` at pixel `(x, y)`. Out-of-bounds writes are
    /// ignored.
    fn plot(&mut self, x: i32, y: i32, color: Rgb, intensity: f32);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Pinhole camera looking down `-z`.
#[derive(Clone, Copy, Debug)]
pub struct Projection {
    pub eye: Vec3,
    pub fov_y: f32,
    pub near: f32,
    viewport: Viewport,
    focal: f32,
}

/// A projected point: pixel coordinates plus distance from the eye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projected {
    pub x: f32,
    pub y: f32,
    pub depth: f32,
}

impl Projection {
    pub fn new(viewport: Viewport) -> Self {
        let fov_y = 75f32.to_radians();
        Self {
            eye: Vec3::new(0.0, 1.0, 5.0),
            fov_y,
            near: 0.1,
            viewport,
            focal: 1.0 / (fov_y * 0.5).tan(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Pixels per world unit at distance `depth`.
    pub fn scale_at(&self, depth: f32) -> f32 {
        self.focal * self.viewport.height as f32 * 0.5 / depth.max(self.near)
    }

    /// `None` for points behind the near plane or outside the viewport.
    pub fn project(&self, p: Vec3) -> Option<Projected> {
        let rel = p - self.eye;
        let depth = -rel.z;
        if depth < self.near {
            return None;
        }
        let ndc_x = rel.x * self.focal / (self.viewport.aspect() * depth);
        let ndc_y = rel.y * self.focal / depth;
        if ndc_x.abs() > 1.0 || ndc_y.abs() > 1.0 {
            return None;
        }
        Some(Projected {
            x: (ndc_x * 0.5 + 0.5) * self.viewport.width as f32,
            y: (0.5 - ndc_y * 0.5) * self.viewport.height as f32,
            depth,
        })
    }
}

/// The small bright body circling the cloud, tinted by the era accent.
#[derive(Clone, Copy, Debug)]
pub struct Orb {
    pub position: Vec3,
    pub color: Rgb,
}

impl Orb {
    fn at(t: f32, color: Rgb) -> Self {
        let a = t * ORB_RATE;
        Self {
            position: Vec3::new(a.sin() * 4.0, 2.0, a.cos() * 4.0),
            color,
        }
    }
}

/// Construction-time parameters. Nothing here changes after `create`.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneConfig {
    pub particle_count: usize,
    /// Dot radius in surface pixels; `1` is a single pixel.
    pub particle_size: u32,
    pub timing: Timing,
    pub rates: Rates,
    pub eras: Vec<Era>,
    /// Fixed seed for reproducible clouds; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub autoplay: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            particle_count: 20_000,
            particle_size: 1,
            timing: Timing::default(),
            rates: Rates::default(),
            eras: default_eras(),
            seed: None,
            autoplay: true,
        }
    }
}

impl SceneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.eras.is_empty() {
            return Err(MorphError::EmptyEraList);
        }
        if self.particle_count > MAX_PARTICLES {
            return Err(MorphError::InvalidParticleCount {
                value: self.particle_count,
                max: MAX_PARTICLES,
            });
        }
        for (name, value) in [("alpha", self.rates.position), ("beta", self.rates.color)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(MorphError::InvalidRate { name, value });
            }
        }
        if self.timing.transition_duration.is_zero() {
            return Err(MorphError::InvalidDuration {
                name: "transition duration",
            });
        }
        Ok(())
    }
}

/// Starting cloud: a white cube of side 10 around the origin.
fn big_bang(count: usize, rng: &mut StdRng) -> Vec<ShapePoint> {
    (0..count)
        .map(|_| {
            let p = Vec3::new(
                (rng.gen::<f32>() - 0.5) * 10.0,
                (rng.gen::<f32>() - 0.5) * 10.0,
                (rng.gen::<f32>() - 0.5) * 10.0,
            );
            ShapePoint::new(p, 1.0)
        })
        .collect()
}

pub struct Scene {
    field: ParticleField,
    scheduler: EraScheduler,
    projection: Projection,
    orb: Orb,
    particle_size: u32,
    now: Duration,
}

impl Scene {
    pub fn create(
        config: SceneConfig,
        viewport: Viewport,
        sink: Box<dyn CaptionSink>,
    ) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let field = ParticleField::new(
            &big_bang(config.particle_count, &mut rng),
            Rgb::WHITE,
            config.rates,
        );
        let accent = config.eras[0].accent;
        let mut scheduler = EraScheduler::new(
            config.eras,
            ShapeGenerator::with_builtins(),
            config.timing,
            rng,
            sink,
        )?;
        scheduler.set_autoplay(config.autoplay, Duration::ZERO);
        info!(
            particles = config.particle_count,
            eras = scheduler.eras().len(),
            width = viewport.width,
            height = viewport.height,
            "scene created"
        );
        Ok(Self {
            field,
            scheduler,
            projection: Projection::new(viewport),
            orb: Orb::at(0.0, accent),
            particle_size: config.particle_size.max(1),
            now: Duration::ZERO,
        })
    }

    /// One frame: poll the scheduler at `now` (time since creation), then
    /// advance the field and the orb. Returns the era entered, if any.
    pub fn tick(&mut self, now: Duration) -> Option<usize> {
        let dt = now.saturating_sub(self.now).min(MAX_STEP);
        self.now = now;
        let entered = self.scheduler.poll(now, &mut self.field);
        self.field.advance(dt);
        let accent = self.scheduler.current_era().accent;
        let k = crate::field::step_fraction(self.field.rates().color, dt);
        self.orb = Orb::at(now.as_secs_f32(), self.orb.color.lerp(accent, k));
        entered
    }

    /// Viewport changes only touch the projection.
    pub fn resize(&mut self, viewport: Viewport) {
        self.projection.set_viewport(viewport);
    }

    pub fn render(&self, surface: &mut dyn Surface) {
        let (w, h) = surface.size();
        let mut projection = self.projection;
        if projection.viewport() != Viewport::new(w, h) {
            projection.set_viewport(Viewport::new(w, h));
        }

        let (sin, cos) = (self.now.as_secs_f32() * SPIN_RATE).sin_cos();
        let snap = self.field.snapshot();
        let r = self.particle_size as i32 - 1;
        for ((p, c), shade) in snap.positions.iter().zip(snap.colors).zip(snap.shades) {
            let spun = Vec3::new(cos * p.x + sin * p.z, p.y, -sin * p.x + cos * p.z);
            let Some(q) = projection.project(spun) else {
                continue;
            };
            let intensity = shade * depth_falloff(q.depth);
            let (cx, cy) = (q.x as i32, q.y as i32);
            for dy in -r..=r {
                for dx in -r..=r {
                    surface.plot(cx + dx, cy + dy, *c, intensity);
                }
            }
        }

        if let Some(q) = projection.project(self.orb.position) {
            let radius = (ORB_RADIUS * projection.scale_at(q.depth)).max(1.0);
            let ri = radius.ceil() as i32;
            for dy in -ri..=ri {
                for dx in -ri..=ri {
                    let d = ((dx * dx + dy * dy) as f32).sqrt() / radius;
                    if d <= 1.0 {
                        surface.plot(q.x as i32 + dx, q.y as i32 + dy, self.orb.color, 1.0 - 0.5 * d);
                    }
                }
            }
        }
    }

    /// Tears the scene down, releasing every buffer.
    pub fn dispose(self) {
        info!(particles = self.field.len(), "scene disposed");
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn field(&self) -> &ParticleField {
        &self.field
    }

    pub fn scheduler(&self) -> &EraScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut EraScheduler {
        &mut self.scheduler
    }

    pub fn orb(&self) -> Orb {
        self.orb
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

fn depth_falloff(depth: f32) -> f32 {
    (1.6 / (1.0 + 0.12 * depth)).clamp(0.15, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::NullSink;
    use crate::shape::ShapeId;

    struct Recorder {
        w: u32,
        h: u32,
        hits: Vec<(i32, i32)>,
    }

    impl Surface for Recorder {
        fn size(&self) -> (u32, u32) {
            (self.w, self.h)
        }
        fn plot(&mut self, x: i32, y: i32, _color: Rgb, _intensity: f32) {
            self.hits.push((x, y));
        }
    }

    fn config(n: usize) -> SceneConfig {
        SceneConfig {
            particle_count: n,
            seed: Some(42),
            ..SceneConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SceneConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_rates_and_empty_eras() {
        let mut c = config(10);
        c.rates.position = 0.0;
        assert!(matches!(c.validate(), Err(MorphError::InvalidRate { name: "alpha", .. })));
        let mut c = config(10);
        c.rates.color = 1.5;
        assert!(matches!(c.validate(), Err(MorphError::InvalidRate { name: "beta", .. })));
        let mut c = config(10);
        c.eras.clear();
        assert_eq!(c.validate(), Err(MorphError::EmptyEraList));
        let mut c = config(10);
        c.timing.transition_duration = Duration::ZERO;
        assert!(c.validate().is_err());
    }

    #[test]
    fn oversized_cloud_is_rejected_before_allocation() {
        let c = config(usize::MAX);
        let err = MorphError::InvalidParticleCount {
            value: usize::MAX,
            max: MAX_PARTICLES,
        };
        assert_eq!(c.validate(), Err(err.clone()));
        let res = Scene::create(c, Viewport::new(10, 10), Box::new(NullSink));
        assert_eq!(res.err(), Some(err));
        assert_eq!(config(MAX_PARTICLES).validate(), Ok(()));
    }

    #[test]
    fn create_starts_on_first_era_with_full_buffers() {
        let scene = Scene::create(config(300), Viewport::new(160, 96), Box::new(NullSink)).unwrap();
        assert_eq!(scene.field().len(), 300);
        assert_eq!(scene.scheduler().current_index(), 0);
        assert!(!scene.scheduler().is_transitioning());
    }

    #[test]
    fn same_seed_same_start() {
        let a = Scene::create(config(50), Viewport::new(10, 10), Box::new(NullSink)).unwrap();
        let b = Scene::create(config(50), Viewport::new(10, 10), Box::new(NullSink)).unwrap();
        assert_eq!(a.field().snapshot().positions, b.field().snapshot().positions);
    }

    #[test]
    fn tick_moves_cloud_after_manual_next() {
        let mut scene = Scene::create(config(200), Viewport::new(80, 48), Box::new(NullSink)).unwrap();
        assert!(scene.scheduler_mut().next());
        assert_eq!(scene.tick(Duration::from_millis(16)), Some(1));
        assert_eq!(scene.scheduler().current_era().shape, ShapeId::Plow);
        let d0 = scene.field().max_distance();
        scene.tick(Duration::from_millis(32));
        assert!(scene.field().max_distance() < d0);
    }

    #[test]
    fn render_plots_inside_the_surface() {
        let scene = Scene::create(config(500), Viewport::new(120, 80), Box::new(NullSink)).unwrap();
        let mut rec = Recorder { w: 120, h: 80, hits: Vec::new() };
        scene.render(&mut rec);
        assert!(!rec.hits.is_empty());
    }

    #[test]
    fn resize_leaves_buffers_alone() {
        let mut scene = Scene::create(config(64), Viewport::new(40, 40), Box::new(NullSink)).unwrap();
        let before = scene.field().snapshot().positions.to_vec();
        scene.resize(Viewport::new(200, 50));
        assert_eq!(scene.projection().viewport(), Viewport::new(200, 50));
        assert_eq!(scene.field().snapshot().positions, before.as_slice());
    }

    #[test]
    fn projection_culls_points_behind_camera() {
        let p = Projection::new(Viewport::new(100, 100));
        assert!(p.project(Vec3::new(0.0, 0.0, 10.0)).is_none());
        let q = p.project(Vec3::new(0.0, 1.0, 0.0)).unwrap();
        assert!((q.x - 50.0).abs() < 1e-3);
        assert!((q.y - 50.0).abs() < 1e-3);
        assert!((q.depth - 5.0).abs() < 1e-6);
    }

    #[test]
    fn orb_drifts_toward_era_accent() {
        let mut eras = default_eras();
        eras[0].accent = Rgb::from_hex(0x0000ff);
        let mut scene = Scene::create(
            SceneConfig { eras, ..config(10) },
            Viewport::new(20, 20),
            Box::new(NullSink),
        )
        .unwrap();
        scene.scheduler_mut().set_autoplay(false, Duration::ZERO);
        assert_eq!(scene.orb().color, Rgb::from_hex(0x0000ff));
        assert!(scene.scheduler_mut().next());
        let mut t = Duration::ZERO;
        for _ in 0..600 {
            t += crate::field::REFERENCE_FRAME;
            scene.tick(t);
        }
        let target = scene.scheduler().current_era().accent;
        assert!(scene.orb().color.max_delta(target) < 0.01);
    }
}
