//! Era cycling: autoplay timer, manual jumps and the idle/transitioning
//! state machine that retargets the particle field.

use crate::era::Era;
use crate::error::{MorphError, Result};
use crate::field::ParticleField;
use crate::shape::ShapeGenerator;
use rand::rngs::StdRng;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receives era changes. Fire-and-forget: nothing is returned.
pub trait CaptionSink {
    fn era_changed(&mut self, name: &str, caption: &str);
}

/// Sink that drops every notice.
pub struct NullSink;

impl CaptionSink for NullSink {
    fn era_changed(&mut self, _name: &str, _caption: &str) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EraNotice {
    pub name: String,
    pub caption: String,
}

impl CaptionSink for Sender<EraNotice> {
    fn era_changed(&mut self, name: &str, caption: &str) {
        // a dropped receiver just means nobody is listening any more
        let _ = self.send(EraNotice {
            name: name.to_string(),
            caption: caption.to_string(),
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Dwell time in `Idle` before autoplay moves on.
    pub era_duration: Duration,
    /// Length of a transition.
    pub transition_duration: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            era_duration: Duration::from_millis(8_000),
            transition_duration: Duration::from_millis(3_000),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle { since: Duration },
    Transitioning { started: Duration, from: usize },
}

/// Everything that changes while a scene runs. Times are offsets from the
/// scene's creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneState {
    pub current: usize,
    pub phase: Phase,
}

pub struct EraScheduler {
    eras: Vec<Era>,
    shapes: ShapeGenerator,
    timing: Timing,
    state: SceneState,
    request: Option<usize>,
    autoplay: bool,
    rng: StdRng,
    sink: Box<dyn CaptionSink>,
}

impl EraScheduler {
    /// Starts idle on era 0 at time zero.
    pub fn new(
        eras: Vec<Era>,
        shapes: ShapeGenerator,
        timing: Timing,
        rng: StdRng,
        sink: Box<dyn CaptionSink>,
    ) -> Result<Self> {
        if eras.is_empty() {
            return Err(MorphError::EmptyEraList);
        }
        Ok(Self {
            eras,
            shapes,
            timing,
            state: SceneState {
                current: 0,
                phase: Phase::Idle {
                    since: Duration::ZERO,
                },
            },
            request: None,
            autoplay: true,
            rng,
            sink,
        })
    }

    pub fn eras(&self) -> &[Era] {
        &self.eras
    }

    pub fn current_index(&self) -> usize {
        self.state.current
    }

    pub fn current_era(&self) -> &Era {
        &self.eras[self.state.current]
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self.state.phase, Phase::Transitioning { .. })
    }

    /// `0..=1` through the running transition, `1` when idle.
    pub fn progress(&self, now: Duration) -> f32 {
        match self.state.phase {
            Phase::Idle { .. } => 1.0,
            Phase::Transitioning { started, .. } => {
                let total = self.timing.transition_duration.as_secs_f32();
                if total <= 0.0 {
                    1.0
                } else {
                    (now.saturating_sub(started).as_secs_f32() / total).clamp(0.0, 1.0)
                }
            }
        }
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    /// Pauses or resumes the autoplay timer. Resuming restarts the dwell.
    pub fn set_autoplay(&mut self, on: bool, now: Duration) {
        if on && !self.autoplay {
            if let Phase::Idle { .. } = self.state.phase {
                self.state.phase = Phase::Idle { since: now };
            }
        }
        self.autoplay = on;
    }

    /// Requests a move to era `index` on the next poll.
    ///
    /// Returns `Ok(false)` when a transition is already running; the request
    /// is dropped in that case.
    pub fn jump_to(&mut self, index: usize) -> Result<bool> {
        if index >= self.eras.len() {
            return Err(MorphError::InvalidIndex {
                index,
                len: self.eras.len(),
            });
        }
        if self.is_transitioning() {
            debug!(index, "jump ignored, transition in progress");
            return Ok(false);
        }
        self.request = Some(index);
        Ok(true)
    }

    /// Requests the following era (wrapping). Same rules as [`jump_to`](Self::jump_to).
    pub fn next(&mut self) -> bool {
        let to = (self.state.current + 1) % self.eras.len();
        self.jump_to(to).unwrap_or(false)
    }

    /// Requests the preceding era (wrapping).
    pub fn previous(&mut self) -> bool {
        let len = self.eras.len();
        let to = (self.state.current + len - 1) % len;
        self.jump_to(to).unwrap_or(false)
    }

    /// Advances the state machine to `now`. At most one transition starts
    /// per call; returns the era entered, if any.
    pub fn poll(&mut self, now: Duration, field: &mut ParticleField) -> Option<usize> {
        match self.state.phase {
            Phase::Transitioning { started, from } => {
                if now.saturating_sub(started) >= self.timing.transition_duration {
                    debug!(from, to = self.state.current, "transition settled");
                    self.state.phase = Phase::Idle { since: now };
                }
                None
            }
            Phase::Idle { since } => {
                let target = match self.request.take() {
                    Some(i) => i,
                    None if self.autoplay
                        && now.saturating_sub(since) >= self.timing.era_duration =>
                    {
                        (self.state.current + 1) % self.eras.len()
                    }
                    None => return None,
                };
                self.begin(target, now, field)
            }
        }
    }

    fn begin(&mut self, target: usize, now: Duration, field: &mut ParticleField) -> Option<usize> {
        let era = &self.eras[target];
        let started = Instant::now();
        let points = match self.shapes.generate(era.shape, field.len(), &mut self.rng) {
            Ok(p) => p,
            Err(e) => {
                warn!(era = %era.name, shape = %era.shape, error = %e, "shape generation failed, staying idle");
                self.state.phase = Phase::Idle { since: now };
                return None;
            }
        };
        if let Err(e) = field.set_targets(&points, era.color) {
            warn!(era = %era.name, error = %e, "retarget rejected, staying idle");
            self.state.phase = Phase::Idle { since: now };
            return None;
        }
        debug!(
            particles = points.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "targets generated"
        );

        let from = self.state.current;
        self.state = SceneState {
            current: target,
            phase: Phase::Transitioning { started: now, from },
        };
        info!(from, to = target, era = %era.name, shape = %era.shape, "era change");
        self.sink.era_changed(&era.name, &era.caption);
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Rates;
    use crate::palette::Rgb;
    use crate::shape::{Recipe, ShapeId, ShapePoint};
    use glam::Vec3;
    use rand::SeedableRng;
    use std::sync::mpsc;

    const DWELL: Duration = Duration::from_millis(1000);
    const MORPH: Duration = Duration::from_millis(500);

    fn era(name: &str, shape: ShapeId) -> Era {
        Era::new(name, "", shape, Rgb::WHITE, Rgb::WHITE)
    }

    fn three_eras() -> Vec<Era> {
        vec![
            era("A", ShapeId::Random),
            era("B", ShapeId::Sphere),
            era("C", ShapeId::Ring),
        ]
    }

    fn timing() -> Timing {
        Timing {
            era_duration: DWELL,
            transition_duration: MORPH,
        }
    }

    fn field(n: usize) -> ParticleField {
        let pts = vec![ShapePoint::new(Vec3::ZERO, 1.0); n];
        ParticleField::new(&pts, Rgb::WHITE, Rates::default())
    }

    fn scheduler(eras: Vec<Era>, shapes: ShapeGenerator) -> EraScheduler {
        EraScheduler::new(
            eras,
            shapes,
            timing(),
            StdRng::seed_from_u64(1),
            Box::new(NullSink),
        )
        .unwrap()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn empty_era_list_is_rejected() {
        let res = EraScheduler::new(
            Vec::new(),
            ShapeGenerator::with_builtins(),
            timing(),
            StdRng::seed_from_u64(1),
            Box::new(NullSink),
        );
        assert!(matches!(res, Err(MorphError::EmptyEraList)));
    }

    #[test]
    fn starts_idle_on_first_era() {
        let s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(0) });
    }

    #[test]
    fn idle_before_dwell_stays_put() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(10);
        for t in (0..1000).step_by(50) {
            assert_eq!(s.poll(ms(t), &mut f), None);
        }
        assert_eq!(s.current_index(), 0);
        assert!(!s.is_transitioning());
    }

    #[test]
    fn late_poll_advances_exactly_once() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(10);
        assert_eq!(s.poll(ms(60_000), &mut f), Some(1));
        assert_eq!(s.poll(ms(60_000), &mut f), None);
        assert_eq!(s.current_index(), 1);
        assert!(s.is_transitioning());
    }

    #[test]
    fn transition_settles_after_duration_then_dwells_again() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(10);
        s.poll(ms(1000), &mut f);
        s.poll(ms(1499), &mut f);
        assert!(s.is_transitioning());
        s.poll(ms(1500), &mut f);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(1500) });
        assert_eq!(s.poll(ms(2499), &mut f), None);
        assert_eq!(s.poll(ms(2500), &mut f), Some(2));
    }

    #[test]
    fn cycle_wraps_to_zero() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(4);
        let mut t = 0;
        let mut seen = Vec::new();
        for _ in 0..8 {
            t += 10_000;
            if let Some(i) = s.poll(ms(t), &mut f) {
                seen.push(i);
            }
        }
        assert_eq!(seen, vec![1, 2, 0, 1]);
    }

    #[test]
    fn jump_while_transitioning_is_ignored() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(10);
        s.poll(ms(1000), &mut f);
        let before = s.state();
        assert_eq!(s.jump_to(0), Ok(false));
        assert!(!s.next());
        assert_eq!(s.state(), before);
        s.poll(ms(1600), &mut f);
        assert_eq!(s.poll(ms(1601), &mut f), None);
        assert_eq!(s.current_index(), 1);
    }

    #[test]
    fn jump_while_idle_fires_on_next_poll() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(10);
        assert_eq!(s.jump_to(2), Ok(true));
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.poll(ms(5), &mut f), Some(2));
        assert_eq!(s.state().phase, Phase::Transitioning { started: ms(5), from: 0 });
    }

    #[test]
    fn previous_wraps_backwards() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(3);
        assert!(s.previous());
        assert_eq!(s.poll(ms(1), &mut f), Some(2));
    }

    #[test]
    fn out_of_range_jump_is_rejected() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        assert_eq!(
            s.jump_to(3),
            Err(MorphError::InvalidIndex { index: 3, len: 3 })
        );
        assert_eq!(s.current_index(), 0);
        let mut f = field(2);
        assert_eq!(s.poll(ms(1), &mut f), None);
    }

    #[test]
    fn missing_shape_keeps_scene_idle_until_next_dwell() {
        let mut shapes = ShapeGenerator::empty();
        shapes.register(ShapeId::Random, Recipe::new(1.0, |_, _| {
            ShapePoint::new(Vec3::ONE, 1.0)
        }));
        let mut s = scheduler(
            vec![era("A", ShapeId::Random), era("B", ShapeId::Ship)],
            shapes,
        );
        let mut f = field(6);
        let targets_before = f.targets().to_vec();

        assert_eq!(s.poll(ms(1000), &mut f), None);
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(1000) });
        assert_eq!(f.targets(), targets_before.as_slice());

        // no retry until another full dwell has passed
        assert_eq!(s.poll(ms(1001), &mut f), None);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(1000) });
        s.poll(ms(2000), &mut f);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(2000) });
    }

    #[test]
    fn failed_manual_jump_is_consumed_and_waits_a_dwell() {
        let mut shapes = ShapeGenerator::empty();
        shapes.register(ShapeId::Random, Recipe::new(1.0, |_, _| {
            ShapePoint::new(Vec3::ONE, 1.0)
        }));
        let mut s = scheduler(
            vec![era("A", ShapeId::Random), era("B", ShapeId::Ship)],
            shapes,
        );
        let mut f = field(6);
        let targets_before = f.targets().to_vec();

        assert_eq!(s.jump_to(1), Ok(true));
        assert_eq!(s.poll(ms(10), &mut f), None);
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(10) });
        assert_eq!(f.targets(), targets_before.as_slice());

        // the request is gone: nothing happens until the dwell runs out
        assert_eq!(s.poll(ms(11), &mut f), None);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(10) });
        assert_eq!(s.poll(ms(1009), &mut f), None);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(10) });
        assert_eq!(s.poll(ms(1010), &mut f), None);
        assert_eq!(s.state().phase, Phase::Idle { since: ms(1010) });
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn sink_hears_every_era_change() {
        let (tx, rx) = mpsc::channel();
        let mut eras = three_eras();
        eras[1].caption = "round".to_string();
        let mut s = EraScheduler::new(
            eras,
            ShapeGenerator::with_builtins(),
            timing(),
            StdRng::seed_from_u64(3),
            Box::new(tx),
        )
        .unwrap();
        let mut f = field(5);
        s.poll(ms(1000), &mut f);
        assert_eq!(
            rx.try_recv(),
            Ok(EraNotice {
                name: "B".to_string(),
                caption: "round".to_string()
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn paused_autoplay_only_moves_on_request() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(5);
        s.set_autoplay(false, ms(0));
        assert_eq!(s.poll(ms(50_000), &mut f), None);
        assert!(s.next());
        assert_eq!(s.poll(ms(50_001), &mut f), Some(1));

        s.poll(ms(60_000), &mut f);
        s.set_autoplay(true, ms(70_000));
        assert_eq!(s.poll(ms(70_500), &mut f), None);
        assert_eq!(s.poll(ms(71_000), &mut f), Some(2));
    }

    #[test]
    fn progress_runs_zero_to_one() {
        let mut s = scheduler(three_eras(), ShapeGenerator::with_builtins());
        let mut f = field(5);
        assert_eq!(s.progress(ms(0)), 1.0);
        s.poll(ms(1000), &mut f);
        assert_eq!(s.progress(ms(1000)), 0.0);
        assert!((s.progress(ms(1250)) - 0.5).abs() < 1e-6);
        assert_eq!(s.progress(ms(9000)), 1.0);
    }
}
