//! Multiplexer configuration
//!
//! Loaded from a JSON file and/or command-line flags. Durations are written
//! in the file as (fractional) seconds.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{StreamMuxError, StreamMuxResult};
use shared::{WorkerId, MAX_WORKERS};

/// One video source and the id of the worker serving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: u32,
    pub url: String,
}

impl SourceConfig {
    pub fn worker_id(&self) -> WorkerId {
        WorkerId(self.id)
    }

    /// Parse the `ID=URL` form used on the command line
    pub fn parse(spec: &str) -> StreamMuxResult<Self> {
        let (id, url) = spec
            .split_once('=')
            .ok_or_else(|| StreamMuxError::config(format!("source '{spec}' is not ID=URL")))?;
        let id = id
            .trim()
            .parse::<u32>()
            .map_err(|e| StreamMuxError::config(format!("source id '{id}': {e}")))?;
        let url = url.trim();
        if url.is_empty() {
            return Err(StreamMuxError::config(format!("source {id} has an empty URL")));
        }
        Ok(Self { id, url: url.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Worker executable; defaults to `producer` next to the running binary
    pub worker_path: Option<PathBuf>,
    pub sources: Vec<SourceConfig>,
    /// No frame for this long marks an `Alive` worker stale
    #[serde(with = "secs")]
    pub staleness_window: Duration,
    /// Bound on a worker that never completes negotiation
    #[serde(with = "secs")]
    pub negotiation_timeout: Duration,
    /// Time spent `Buried` before respawning
    #[serde(with = "secs")]
    pub cooldown: Duration,
    /// Minimum gap between spawn attempts while `Creating`
    #[serde(with = "secs")]
    pub spawn_retry_interval: Duration,
    #[serde(with = "secs")]
    pub reader_interval: Duration,
    #[serde(with = "secs")]
    pub tick_interval: Duration,
    #[serde(with = "secs")]
    pub poll_timeout: Duration,
    #[serde(with = "secs")]
    pub stats_interval: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            worker_path: None,
            sources: Vec::new(),
            staleness_window: Duration::from_secs(180),
            negotiation_timeout: Duration::from_secs(300),
            cooldown: Duration::from_secs(20),
            spawn_retry_interval: Duration::from_secs(20),
            reader_interval: Duration::from_millis(10),
            tick_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_millis(100),
            stats_interval: Duration::from_secs(1),
        }
    }
}

impl MuxConfig {
    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> StreamMuxResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Add a source (fluent API)
    pub fn with_source(mut self, id: u32, url: impl Into<String>) -> Self {
        self.sources.push(SourceConfig { id, url: url.into() });
        self
    }

    /// Set the worker executable (fluent API)
    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> StreamMuxResult<()> {
        if self.sources.is_empty() {
            return Err(StreamMuxError::config("at least one source is required"));
        }
        if self.sources.len() > MAX_WORKERS {
            return Err(StreamMuxError::TooManyWorkers { limit: MAX_WORKERS });
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id) {
                return Err(StreamMuxError::config(format!("duplicate source id {}", source.id)));
            }
        }

        if self.negotiation_timeout < self.staleness_window {
            return Err(StreamMuxError::config(
                "negotiation_timeout must not be shorter than staleness_window",
            ));
        }

        let intervals = [
            ("staleness_window", self.staleness_window),
            ("spawn_retry_interval", self.spawn_retry_interval),
            ("reader_interval", self.reader_interval),
            ("tick_interval", self.tick_interval),
            ("poll_timeout", self.poll_timeout),
            ("stats_interval", self.stats_interval),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(StreamMuxError::config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Resolve the worker executable path
    pub fn resolve_worker_path(&self) -> StreamMuxResult<PathBuf> {
        if let Some(path) = &self.worker_path {
            return Ok(path.clone());
        }
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| StreamMuxError::config("cannot locate the running executable"))?;
        Ok(dir.join("producer"))
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
