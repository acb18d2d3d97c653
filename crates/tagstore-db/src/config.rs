//! Database configuration.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for a [`crate::TagDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDbConfig {
    /// RocksDB directory, created if missing
    pub data_dir: PathBuf,

    /// Operations younger than this are not offered for gossip
    pub gossip_min_age: Duration,

    /// How many operations a random gossip sample returns
    pub gossip_count: usize,

    /// Probe budget for random sampling
    pub sample_attempts: usize,
}

impl Default for TagDbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tagstore-data"),
            gossip_min_age: Duration::from_secs(60),
            gossip_count: 10,
            sample_attempts: 100,
        }
    }
}

impl TagDbConfig {
    /// Config for a specific directory, defaults otherwise.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = lookup("TAGSTORE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let gossip_min_age = parse(&lookup, "TAGSTORE_GOSSIP_MIN_AGE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.gossip_min_age);

        let gossip_count = parse(&lookup, "TAGSTORE_GOSSIP_COUNT")?.unwrap_or(defaults.gossip_count);

        let sample_attempts =
            parse(&lookup, "TAGSTORE_SAMPLE_ATTEMPTS")?.unwrap_or(defaults.sample_attempts);

        Ok(Self {
            data_dir,
            gossip_min_age,
            gossip_count,
            sample_attempts,
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::InvalidArgument(format!("{name}={raw:?}: {e}")))
        })
        .transpose()
}
