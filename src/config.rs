use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use eramorph::{default_eras, Era, Rates, SceneConfig, Timing};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser, Debug, Default)]
#[command(name = "eramorph", version, about = "particle cloud morphing through the eras")]
pub(crate) struct Args {
    /// number of particles
    #[arg(long)]
    pub(crate) particles: Option<usize>,

    /// dot radius in braille sub-pixels
    #[arg(long)]
    pub(crate) size: Option<u32>,

    /// length of one transition in ms
    #[arg(long)]
    pub(crate) transition_ms: Option<u64>,

    /// how long each era rests before autoplay moves on, in ms
    #[arg(long)]
    pub(crate) era_ms: Option<u64>,

    /// position approach rate per 60 Hz frame
    #[arg(long)]
    pub(crate) alpha: Option<f32>,

    /// color approach rate per 60 Hz frame
    #[arg(long)]
    pub(crate) beta: Option<f32>,

    /// frame cap
    #[arg(long)]
    pub(crate) fps: Option<u32>,

    /// rng seed (0 = random)
    #[arg(long)]
    pub(crate) seed: Option<u64>,

    /// monochrome output
    #[arg(long)]
    pub(crate) no_color: bool,

    /// start with autoplay paused
    #[arg(long)]
    pub(crate) no_autoplay: bool,

    /// settings file to use instead of the one in the data dir
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// where to write the log
    #[arg(long)]
    pub(crate) log_file: Option<PathBuf>,

    /// print the built-in shapes and exit
    #[arg(long)]
    pub(crate) list_shapes: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) particles: usize,
    pub(crate) particle_size: u32,
    pub(crate) transition_ms: u64,
    pub(crate) era_ms: u64,
    pub(crate) alpha: f32,
    pub(crate) beta: f32,
    pub(crate) fps_cap: u32,
    pub(crate) enable_color: bool,
    pub(crate) autoplay: bool,
    pub(crate) seed: u64,
    pub(crate) eras: Vec<Era>,
}

impl Default for Settings {
    fn default() -> Self {
        let timing = Timing::default();
        let rates = Rates::default();
        Self {
            particles: 20_000,
            particle_size: 1,
            transition_ms: timing.transition_duration.as_millis() as u64,
            era_ms: timing.era_duration.as_millis() as u64,
            alpha: rates.position,
            beta: rates.color,
            fps_cap: 60,
            enable_color: true,
            autoplay: true,
            seed: 0,
            eras: default_eras(),
        }
    }
}

impl Settings {
    /// Command-line flags win over whatever the file said.
    pub(crate) fn apply_args(&mut self, args: &Args) {
        if let Some(v) = args.particles {
            self.particles = v;
        }
        if let Some(v) = args.size {
            self.particle_size = v;
        }
        if let Some(v) = args.transition_ms {
            self.transition_ms = v;
        }
        if let Some(v) = args.era_ms {
            self.era_ms = v;
        }
        if let Some(v) = args.alpha {
            self.alpha = v;
        }
        if let Some(v) = args.beta {
            self.beta = v;
        }
        if let Some(v) = args.fps {
            self.fps_cap = v;
        }
        if let Some(v) = args.seed {
            self.seed = v;
        }
        if args.no_color {
            self.enable_color = false;
        }
        if args.no_autoplay {
            self.autoplay = false;
        }
    }

    pub(crate) fn scene_config(&self) -> Result<SceneConfig> {
        let config = SceneConfig {
            particle_count: self.particles,
            particle_size: self.particle_size,
            timing: Timing {
                era_duration: Duration::from_millis(self.era_ms),
                transition_duration: Duration::from_millis(self.transition_ms),
            },
            rates: Rates {
                position: self.alpha,
                color: self.beta,
            },
            eras: self.eras.clone(),
            seed: (self.seed != 0).then_some(self.seed),
            autoplay: self.autoplay,
        };
        config.validate().context("invalid settings")?;
        Ok(config)
    }

    pub(crate) fn frame_time(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.fps_cap.clamp(10, 240) as f32)
    }
}

pub(crate) struct Paths {
    pub(crate) settings_path: PathBuf,
    pub(crate) log_path: PathBuf,
}

pub(crate) fn project_paths() -> Result<Paths> {
    let proj = ProjectDirs::from("com", "eramorph", "Eramorph")
        .context("could not resolve project directories")?;
    let dir = proj.data_local_dir().to_path_buf();
    fs::create_dir_all(&dir).ok();
    Ok(Paths {
        settings_path: dir.join("settings.json"),
        log_path: dir.join("eramorph.log"),
    })
}

/// A missing file means defaults; anything unreadable or malformed is an error.
pub(crate) fn load_settings(path: &Path) -> Result<Settings> {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s)
            .with_context(|| format!("could not parse {}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(e) => Err(e).with_context(|| format!("could not read {}", path.display())),
    }
}
