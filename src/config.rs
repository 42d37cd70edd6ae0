use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{CogWindowError, Result};

/// How to pick an overview level when the requested resolution falls between two levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ZoomLevelStrategy {
    /// `UPPER`, 0%: the coarsest level whose resolution is at or below the
    /// requested resolution.
    PreferCoarser,
    /// `LOWER`, 100%: level `i` as soon as the request is coarser than level `i - 1`.
    PreferFiner,
    /// Switch to the finer level once the request is this many percent of the way to it
    /// (`AUTO` is 50%).
    Blend(u8),
}

impl Default for ZoomLevelStrategy {
    fn default() -> Self {
        Self::Blend(50)
    }
}

impl ZoomLevelStrategy {
    /// The threshold percentage used by the overview selector.
    pub fn percentage(&self) -> Result<u8> {
        match *self {
            Self::PreferCoarser => Ok(0),
            Self::PreferFiner => Ok(100),
            Self::Blend(percentage) if percentage <= 100 => Ok(percentage),
            Self::Blend(percentage) => Err(CogWindowError::Config(format!(
                "zoom level strategy percentage must be within 0-100, got {percentage}"
            ))),
        }
    }
}

impl FromStr for ZoomLevelStrategy {
    type Err = CogWindowError;

    fn from_str(s: &str) -> Result<Self> {
        let strategy = match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Self::Blend(50),
            "LOWER" => Self::PreferFiner,
            "UPPER" => Self::PreferCoarser,
            other => {
                let percentage = other.parse::<u8>().map_err(|_| {
                    CogWindowError::Config(format!("unknown zoom level strategy {s:?}"))
                })?;
                Self::Blend(percentage)
            }
        };
        strategy.percentage()?;
        Ok(strategy)
    }
}

impl TryFrom<String> for ZoomLevelStrategy {
    type Error = CogWindowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for ZoomLevelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreferCoarser => write!(f, "UPPER"),
            Self::PreferFiner => write!(f, "LOWER"),
            Self::Blend(50) => write!(f, "AUTO"),
            Self::Blend(percentage) => write!(f, "{percentage}"),
        }
    }
}

/// Settings for a [`crate::COGReader`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub zoom_level_strategy: ZoomLevelStrategy,
    /// Fetch each row of tiles with one range request instead of one request per tile.
    pub merge_consecutive_ranges: bool,
    /// Maximum number of tiles decoded at the same time.
    pub decode_concurrency: usize,
    /// Keep fetched blocks in memory and serve repeated ranges from there.
    pub enable_block_cache: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            zoom_level_strategy: ZoomLevelStrategy::default(),
            merge_consecutive_ranges: false,
            decode_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            enable_block_cache: false,
        }
    }
}

impl ReaderConfig {
    /// Read `ZOOM_LEVEL_STRATEGY`, `HTTP_MERGE_CONSECUTIVE_RANGES`,
    /// `DECODE_CONCURRENCY` and `ENABLE_BLOCK_CACHE` from the environment,
    /// falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(strategy) = lookup("ZOOM_LEVEL_STRATEGY") {
            config.zoom_level_strategy = strategy.parse()?;
        }
        if let Some(merge) = lookup("HTTP_MERGE_CONSECUTIVE_RANGES") {
            config.merge_consecutive_ranges = merge.trim().eq_ignore_ascii_case("TRUE");
        }
        if let Some(cache) = lookup("ENABLE_BLOCK_CACHE") {
            config.enable_block_cache = cache.trim().eq_ignore_ascii_case("TRUE");
        }
        if let Some(concurrency) = lookup("DECODE_CONCURRENCY") {
            config.decode_concurrency = concurrency.trim().parse().map_err(|_| {
                CogWindowError::Config(format!("invalid DECODE_CONCURRENCY {concurrency:?}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.zoom_level_strategy.percentage()?;
        if self.decode_concurrency == 0 {
            return Err(CogWindowError::Config(
                "decode_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
