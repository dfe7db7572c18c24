use crate::config::{load_settings, project_paths, Args, Settings};
use crate::input::{collect_input_nonblocking, map_event_to_action, Action};
use crate::render::{canvas_size, canvas_to_cells, help_overlay, hud_overlay, Hud, Terminal};
use anyhow::{Context, Result};
use clap::Parser;
use eramorph::{EraNotice, Scene, ShapeId, Viewport};
use std::fs::File;
use std::path::Path;
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CAPTION_FADE: Duration = Duration::from_millis(600);
/// Frames between FPS samples.
const FPS_WINDOW: u32 = 30;

struct Caption {
    name: String,
    text: String,
    shown_at: Instant,
}

struct FpsCounter {
    frames: u32,
    since: Instant,
    value: u32,
}

impl FpsCounter {
    fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            since: now,
            value: 0,
        }
    }

    fn frame(&mut self, now: Instant) {
        self.frames += 1;
        if self.frames >= FPS_WINDOW {
            let secs = now.saturating_duration_since(self.since).as_secs_f32();
            if secs > 0.0 {
                self.value = (self.frames as f32 / secs).round() as u32;
            }
            self.frames = 0;
            self.since = now;
        }
    }
}

pub(crate) struct App {
    settings: Settings,
    scene: Scene,
    captions: mpsc::Receiver<EraNotice>,
    caption: Caption,
    term: Terminal,
    show_help: bool,
    should_quit: bool,
}

/// Everything built from settings before the terminal is touched.
struct Prepared {
    scene: Scene,
    captions: mpsc::Receiver<EraNotice>,
    caption: Caption,
}

fn prepare(settings: &Settings, cols: u16, rows: u16) -> Result<Prepared> {
    let config = settings.scene_config()?;
    let (tx, rx) = mpsc::channel();
    let first = config.eras[0].clone();
    let (w, h) = canvas_size(cols, rows);
    let scene =
        Scene::create(config, Viewport::new(w, h), Box::new(tx)).context("could not create scene")?;
    Ok(Prepared {
        scene,
        captions: rx,
        caption: Caption {
            name: first.name,
            text: first.caption,
            shown_at: Instant::now(),
        },
    })
}

impl App {
    fn init(settings: Settings) -> Result<Self> {
        let (cols, rows) = crossterm::terminal::size()?;
        let Prepared {
            scene,
            captions,
            caption,
        } = prepare(&settings, cols, rows)?;

        // last fallible step: raw mode only once the scene exists
        let term = Terminal::begin()?;

        Ok(Self {
            settings,
            scene,
            captions,
            caption,
            term,
            show_help: false,
            should_quit: false,
        })
    }

    fn run(&mut self) -> Result<()> {
        let frame_dt = self.settings.frame_time();
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);

        while !self.should_quit {
            if self.term.resize_if_needed()? {
                debug!(cols = self.term.cols, rows = self.term.rows, "terminal resized");
                self.scene
                    .resize(Viewport::new(self.term.canvas.w, self.term.canvas.h));
            }

            for ev in collect_input_nonblocking(frame_dt)? {
                if let Some(action) = map_event_to_action(&ev) {
                    self.apply(action, start.elapsed());
                }
            }

            self.scene.tick(start.elapsed());
            while let Ok(notice) = self.captions.try_recv() {
                self.caption = Caption {
                    name: notice.name,
                    text: notice.caption,
                    shown_at: Instant::now(),
                };
            }

            let frame_start = Instant::now();
            fps.frame(frame_start);
            self.render_frame(fps.value)?;
            spin_sleep(frame_dt, frame_start);
        }
        Ok(())
    }

    fn apply(&mut self, action: Action, now: Duration) {
        let scheduler = self.scene.scheduler_mut();
        match action {
            Action::Quit => self.should_quit = true,
            Action::Next => {
                scheduler.next();
            }
            Action::Previous => {
                scheduler.previous();
            }
            Action::Jump(i) => {
                if let Err(e) = scheduler.jump_to(i) {
                    debug!(error = %e, "jump ignored");
                }
            }
            Action::ToggleAutoplay => {
                let on = !scheduler.autoplay();
                scheduler.set_autoplay(on, now);
                info!(autoplay = on, "autoplay toggled");
            }
            Action::ToggleHelp => self.show_help = !self.show_help,
        }
    }

    fn render_frame(&mut self, fps: u32) -> Result<()> {
        self.term.cur.clear(crossterm::style::Color::Black);
        self.term.canvas.clear();
        self.scene.render(&mut self.term.canvas);
        canvas_to_cells(&self.term.canvas, &mut self.term.cur, self.settings.enable_color);

        let scheduler = self.scene.scheduler();
        let fade = self.caption.shown_at.elapsed().as_secs_f32() / CAPTION_FADE.as_secs_f32();
        hud_overlay(
            &mut self.term.cur,
            &Hud {
                era_name: &self.caption.name,
                caption: &self.caption.text,
                caption_alpha: fade.min(1.0),
                era_index: scheduler.current_index(),
                era_count: scheduler.eras().len(),
                particles: self.scene.field().len(),
                fps,
                autoplay: scheduler.autoplay(),
                transitioning: scheduler.is_transitioning(),
                progress: scheduler.progress(self.scene.now()),
                enable_color: self.settings.enable_color,
            },
        );
        if self.show_help {
            help_overlay(&mut self.term.cur);
        }

        self.term.present()
    }
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("could not open log {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ERAMORPH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .init();
    Ok(())
}

pub(crate) fn run() -> Result<()> {
    let args = Args::parse();

    if args.list_shapes {
        for id in ShapeId::ALL {
            println!("{id}");
        }
        return Ok(());
    }

    let paths = project_paths()?;
    init_logging(args.log_file.as_deref().unwrap_or(paths.log_path.as_path()))?;

    let mut settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => load_settings(&paths.settings_path).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring settings file");
            Settings::default()
        }),
    };
    settings.apply_args(&args);

    let mut app = App::init(settings)?;
    let res = app.run();
    let App { mut term, scene, .. } = app;
    let ended = term.end();
    scene.dispose();
    res.and(ended)
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, start: Instant) {
    let end = start + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        if end - t > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_cloud_fails_before_raw_mode() {
        let settings = Settings {
            particles: usize::MAX,
            ..Settings::default()
        };
        let err = prepare(&settings, 80, 24).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<eramorph::MorphError>(),
            Some(eramorph::MorphError::InvalidParticleCount { .. })
        ));
    }

    #[test]
    fn prepared_scene_matches_terminal_canvas() {
        let settings = Settings {
            particles: 64,
            seed: 3,
            ..Settings::default()
        };
        let p = prepare(&settings, 80, 24).unwrap();
        assert_eq!(p.scene.projection().viewport(), Viewport::new(160, 96));
        assert_eq!(p.caption.name, "GENESIS");
        assert!(p.captions.try_recv().is_err());
    }

    #[test]
    fn fps_sampled_every_window() {
        let t0 = Instant::now();
        let mut c = FpsCounter::new(t0);
        for i in 1..FPS_WINDOW {
            c.frame(t0 + Duration::from_millis(16) * i);
        }
        assert_eq!(c.value, 0);
        c.frame(t0 + Duration::from_millis(500));
        assert_eq!(c.value, 60);
    }
}
