//! Cache configuration.
//!
//! [`CacheSettings`] is plain data that an embedding application can keep in
//! its own config file; [`SymbolCacheBuilder`] adds the clock and builds the
//! cache. Defaults for TTL and sharding can be overridden per process through
//! `SYMBOL_CACHE_TTL_MS` and `SYMBOL_CACHE_SHARDING`.

use crate::cache::SymbolCache;
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const TTL_ENV: &str = "SYMBOL_CACHE_TTL_MS";
pub const SHARDING_ENV: &str = "SYMBOL_CACHE_SHARDING";

const BUILTIN_TTL_MS: u64 = 10_000;
const BUILTIN_SHARDING: usize = 16;

/// Upper bound on the number of shards.
pub const MAX_SHARDS: usize = 1 << 10;

/// Tunable cache parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Total initial capacity, split evenly across shards.
    #[serde(default)]
    pub initial_capacity: usize,

    /// How long a weak entry survives without being touched.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Requested shard count; rounded up to a power of two, capped at [`MAX_SHARDS`].
    #[serde(default = "default_sharding")]
    pub sharding: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            ttl_ms: default_ttl_ms(),
            sharding: default_sharding(),
        }
    }
}

impl CacheSettings {
    /// Number of shards actually allocated for these settings.
    pub fn shard_count(&self) -> usize {
        self.sharding.max(1).next_power_of_two().min(MAX_SHARDS)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sharding == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "invalid sharding: {}",
                self.sharding
            )));
        }
        Ok(())
    }
}

/// Default TTL, read once from `SYMBOL_CACHE_TTL_MS`.
pub fn default_ttl_ms() -> u64 {
    static TTL: OnceLock<u64> = OnceLock::new();
    *TTL.get_or_init(|| env_or(TTL_ENV, BUILTIN_TTL_MS))
}

/// Default sharding, read once from `SYMBOL_CACHE_SHARDING`.
pub fn default_sharding() -> usize {
    static SHARDING: OnceLock<usize> = OnceLock::new();
    *SHARDING.get_or_init(|| match env_or(SHARDING_ENV, BUILTIN_SHARDING) {
        0 => {
            tracing::warn!(var = SHARDING_ENV, "sharding must be positive, using default");
            BUILTIN_SHARDING
        }
        n => n,
    })
}

fn env_or<T>(var: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    parse_or(var, std::env::var(var).ok().as_deref(), default)
}

fn parse_or<T>(var: &str, raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match raw.map(|s| s.trim().parse::<T>()) {
        None => default,
        Some(Ok(v)) => v,
        Some(Err(_)) => {
            tracing::warn!(var, value = raw.unwrap_or_default(), "unparseable override, using default");
            default
        }
    }
}

/// Builder for [`SymbolCache`].
#[derive(Debug, Clone)]
pub struct SymbolCacheBuilder {
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
}

impl Default for SymbolCacheBuilder {
    fn default() -> Self {
        Self {
            settings: CacheSettings::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl SymbolCacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all tunables at once, e.g. with values loaded from a config file.
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.settings.initial_capacity = capacity;
        self
    }

    /// Clock used for weak-entry timestamps and sweep cutoffs.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.settings.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn sharding(mut self, sharding: usize) -> Self {
        self.settings.sharding = sharding;
        self
    }

    pub fn build(self) -> Result<SymbolCache> {
        self.settings.validate()?;
        Ok(SymbolCache::from_parts(self.settings, self.clock))
    }
}
