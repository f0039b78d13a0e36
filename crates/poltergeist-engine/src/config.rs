//! Engine configuration.
//!
//! Holds session pacing, gameplay tuning and the scripted input timeline.
//! Configuration can be loaded from and saved to a TOML file.

use glam::{Vec2, Vec3};
use poltergeist_gameplay::locomotion::LocomotionConfig;
use poltergeist_gameplay::scene::SceneConfig;
use poltergeist_gameplay::HostileConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "poltergeist.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// What to spawn at the start of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Spawn {
    /// Mobile sweeper
    Broom {
        /// Spawn point
        position: Vec3,
    },
    /// Rooted grabber
    HauntedTree {
        /// Root position
        position: Vec3,
        /// Facing in degrees
        #[serde(default)]
        yaw: f32,
    },
    /// Lump that bursts when hit
    CandyLump {
        /// Center
        position: Vec3,
    },
}

/// Input change applied at a point in session time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    /// Holds the movement stick
    Move {
        /// Stick position
        axis: Vec2,
    },
    /// Holds a look rate
    Look {
        /// Degrees per second
        rate: Vec2,
    },
    /// Holds or releases jump
    Jump {
        /// Button state
        held: bool,
    },
    /// Presses roll once
    Roll,
    /// Presses the primary ability once
    Ability1,
    /// Presses the secondary ability once
    Ability2,
}

/// One entry of the scripted timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// Session time in seconds
    pub at: f32,
    /// What happens
    #[serde(flatten)]
    pub action: ScriptAction,
}

/// Engine configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Session ===
    /// Simulated frames per second
    pub target_fps: u32,
    /// Session length in seconds
    pub duration: f32,
    /// Pace frames against the wall clock instead of running flat out
    pub realtime: bool,
    /// Log output format
    pub log_format: LogFormat,
    /// Player start position
    pub player_start: Vec3,

    // === Gameplay ===
    /// Scene seed and fixed step
    pub scene: SceneConfig,
    /// Player locomotion tuning
    pub locomotion: LocomotionConfig,
    /// Overrides applied to every spawned broom
    pub broom: Option<HostileConfig>,
    /// Initial spawns
    pub spawns: Vec<Spawn>,
    /// Scripted input
    pub script: Vec<ScriptEvent>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            duration: 10.0,
            realtime: false,
            log_format: LogFormat::Pretty,
            player_start: Vec3::ZERO,

            scene: SceneConfig::default(),
            locomotion: LocomotionConfig::default(),
            broom: None,
            spawns: vec![
                Spawn::Broom {
                    position: Vec3::new(0.0, 0.0, 4.0),
                },
                Spawn::CandyLump {
                    position: Vec3::new(3.0, 0.5, 3.0),
                },
            ],
            script: vec![
                ScriptEvent {
                    at: 0.5,
                    action: ScriptAction::Move { axis: Vec2::Y },
                },
                ScriptEvent {
                    at: 2.0,
                    action: ScriptAction::Roll,
                },
            ],
        }
    }
}

/// What reading the config file produced.
///
/// Reading happens before logging is installed, so the outcome is kept
/// and reported once the subscriber is up.
#[derive(Debug)]
pub enum ConfigLoad {
    /// Parsed from the file
    Loaded(EngineConfig),
    /// No file at the path
    Missing,
    /// The file could not be read or parsed
    Invalid(String),
}

impl ConfigLoad {
    /// Log format to install the subscriber with.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        match self {
            Self::Loaded(config) => config.log_format,
            Self::Missing | Self::Invalid(_) => LogFormat::default(),
        }
    }

    /// Reports the outcome and returns the config, falling back to defaults.
    pub fn resolve(self, path: &Path) -> EngineConfig {
        match self {
            Self::Loaded(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Self::Missing => {
                info!("Config file not found, using defaults");
                EngineConfig::default()
            },
            Self::Invalid(e) => {
                warn!("Failed to load config file {}: {e}", path.display());
                EngineConfig::default()
            },
        }
    }
}

impl EngineConfig {
    /// Reads configuration from `path` without logging.
    pub fn read<P: AsRef<Path>>(path: P) -> ConfigLoad {
        let path = path.as_ref();
        if !path.exists() {
            return ConfigLoad::Missing;
        }

        let mut contents = String::new();
        if let Err(e) = fs::File::open(path).and_then(|mut file| file.read_to_string(&mut contents)) {
            return ConfigLoad::Invalid(e.to_string());
        }

        match toml::from_str(&contents) {
            Ok(config) => ConfigLoad::Loaded(config),
            Err(e) => ConfigLoad::Invalid(e.to_string()),
        }
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        Self::read(path.as_ref()).resolve(path.as_ref())
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp pacing to sensible ranges and order the script by time.
    ///
    /// Gameplay tuning that the simulation rejects falls back to defaults.
    pub fn validate(&mut self) {
        self.target_fps = self.target_fps.clamp(10, 240);
        self.duration = self.duration.clamp(0.0, 3600.0);
        self.scene.fixed_dt = self.scene.fixed_dt.clamp(0.001, 0.1);
        self.scene.event_capacity = self.scene.event_capacity.clamp(1, 1 << 16);

        if let Err(e) = self.locomotion.validate() {
            warn!("Rejected locomotion tuning, using defaults: {e}");
            self.locomotion = LocomotionConfig::default();
        }
        if let Some(Err(e)) = self.broom.as_ref().map(HostileConfig::validate) {
            warn!("Rejected broom tuning, using defaults: {e}");
            self.broom = None;
        }

        self.script.retain(|event| event.at.is_finite() && event.at >= 0.0);
        self.script.sort_by(|a, b| a.at.total_cmp(&b.at));
    }
}
