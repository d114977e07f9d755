use anyhow::{Context, Result};
use presence_core::evaluator::{DEFAULT_ABSENT_THRESHOLD, DEFAULT_WINDOW};
use presence_core::matcher::{DEFAULT_FALLBACK_TOLERANCE, DEFAULT_MATCH_TOLERANCE};
use presence_core::WindowConfig;
use presence_store::StoreBackend;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How frame timestamps are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedClock {
    /// Use each frame's recorded `t` offset.
    Replay,
    /// Stamp each frame with the monotonic clock on arrival.
    Live,
}

impl FromStr for FeedClock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" => Ok(FeedClock::Replay),
            "live" => Ok(FeedClock::Live),
            other => Err(format!("unknown feed clock {other:?}")),
        }
    }
}

/// Optional TOML file named by `PRESENCE_CONFIG`. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub roster_path: Option<PathBuf>,
    pub feed_path: Option<PathBuf>,
    pub feed_clock: Option<FeedClock>,
    pub store_backend: Option<StoreBackend>,
    pub store_path: Option<PathBuf>,
    pub window_secs: Option<f64>,
    pub absent_threshold_secs: Option<f64>,
    pub match_tolerance: Option<f32>,
    pub fallback_tolerance: Option<f32>,
    pub single_person: Option<bool>,
    pub status_interval_secs: Option<u64>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&src).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Daemon configuration: `PRESENCE_*` environment variables over the
/// optional config file over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON roster of enrolled people.
    pub roster_path: PathBuf,
    /// NDJSON detection feed; stdin when unset.
    pub feed_path: Option<PathBuf>,
    pub feed_clock: FeedClock,
    pub store_backend: StoreBackend,
    pub store_path: PathBuf,
    /// Nominal evaluation window.
    pub window: Duration,
    /// Absence run that finalizes into the absence total.
    pub absent_threshold: Duration,
    /// Max distance to a person's averaged encoding.
    pub match_tolerance: f32,
    /// Max distance to any single enrollment encoding.
    pub fallback_tolerance: f32,
    /// Treat frames with several faces as unrecognizable.
    pub single_person: bool,
    /// Period of the printed status panel; `None` disables it.
    pub status_interval: Option<Duration>,
}

impl Config {
    /// Load from the process environment and `PRESENCE_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let file = match std::env::var_os("PRESENCE_CONFIG") {
            Some(path) => FileConfig::read(Path::new(&path))?,
            None => FileConfig::default(),
        };
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    /// Resolve configuration from a parsed file and an environment lookup.
    pub fn from_sources<F>(file: FileConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presence");

        let roster_path = env("PRESENCE_ROSTER")
            .map(PathBuf::from)
            .or(file.roster_path)
            .unwrap_or_else(|| data_dir.join("roster.json"));

        let feed_path = env("PRESENCE_FEED").map(PathBuf::from).or(file.feed_path);
        let default_clock = if feed_path.is_some() {
            FeedClock::Replay
        } else {
            FeedClock::Live
        };
        let feed_clock = parsed(&env, "PRESENCE_FEED_CLOCK")
            .or(file.feed_clock)
            .unwrap_or(default_clock);

        let store_backend = parsed(&env, "PRESENCE_STORE_BACKEND")
            .or(file.store_backend)
            .unwrap_or_default();
        let store_path = env("PRESENCE_STORE_PATH")
            .map(PathBuf::from)
            .or(file.store_path)
            .unwrap_or_else(|| data_dir.join(store_backend.default_file_name()));

        let window = positive_secs(
            parsed(&env, "PRESENCE_WINDOW_SECS").or(file.window_secs),
            DEFAULT_WINDOW,
            "window_secs",
        );
        let absent_threshold = positive_secs(
            parsed(&env, "PRESENCE_ABSENT_THRESHOLD_SECS").or(file.absent_threshold_secs),
            DEFAULT_ABSENT_THRESHOLD,
            "absent_threshold_secs",
        );

        let status_interval = parsed(&env, "PRESENCE_STATUS_INTERVAL_SECS")
            .or(file.status_interval_secs)
            .filter(|&s| s > 0)
            .map(Duration::from_secs);

        Self {
            roster_path,
            feed_path,
            feed_clock,
            store_backend,
            store_path,
            window,
            absent_threshold,
            match_tolerance: parsed(&env, "PRESENCE_MATCH_TOLERANCE")
                .or(file.match_tolerance)
                .unwrap_or(DEFAULT_MATCH_TOLERANCE),
            fallback_tolerance: parsed(&env, "PRESENCE_FALLBACK_TOLERANCE")
                .or(file.fallback_tolerance)
                .unwrap_or(DEFAULT_FALLBACK_TOLERANCE),
            single_person: env("PRESENCE_SINGLE_PERSON")
                .and_then(|v| parse_bool(&v))
                .or(file.single_person)
                .unwrap_or(false),
            status_interval,
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            window: self.window,
            absent_threshold: self.absent_threshold,
        }
    }
}

/// `PRESENCE_VERBOSE`, read before logging is set up.
pub fn verbose_from_env() -> bool {
    std::env::var("PRESENCE_VERBOSE")
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(false)
}

fn parsed<T, F>(env: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn positive_secs(value: Option<f64>, default: Duration, key: &str) -> Duration {
    match value {
        None => default,
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(d) if !d.is_zero() => d,
            _ => {
                tracing::warn!(
                    key,
                    secs,
                    default_secs = default.as_secs_f64(),
                    "setting must be positive; using default"
                );
                default
            }
        },
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
