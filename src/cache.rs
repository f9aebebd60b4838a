//! SymbolCache: public facade routing every call to one shard.

use crate::clock::{Clock, SystemClock};
use crate::config::{CacheSettings, SymbolCacheBuilder};
use crate::entry::Entry;
use crate::error::Result;
use crate::key::{hash_from_key, payload_from_key, SymbolKey};
use crate::shard::SymbolShard;
use crate::symbol::Symbol;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Concurrent interning cache for symbols.
///
/// Two storage modes:
/// - weak: [`resolve`](Self::resolve) / [`resolve_key`](Self::resolve_key)
///   keep an entry alive for the configured TTL after its last touch;
/// - strong: [`acquire`](Self::acquire) pins an entry until the matching
///   [`release`](Self::release).
///
/// Expired weak entries are only evicted by [`clean_up`](Self::clean_up),
/// which the owner is expected to call periodically; the cache spawns no
/// threads of its own.
#[derive(Debug)]
pub struct SymbolCache {
    shards: Box<[SymbolShard]>,
    mask: usize,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolCache {
    /// Cache with default settings and the system clock.
    pub fn new() -> Self {
        Self::from_parts(CacheSettings::default(), Arc::new(SystemClock))
    }

    pub fn builder() -> SymbolCacheBuilder {
        SymbolCacheBuilder::new()
    }

    pub(crate) fn from_parts(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let count = settings.shard_count();
        let per_shard = settings.initial_capacity / count;
        let shards: Box<[SymbolShard]> = (0..count)
            .map(|_| SymbolShard::with_capacity(per_shard))
            .collect();
        tracing::debug!(
            shards = count,
            ttl_ms = settings.ttl_ms,
            initial_capacity = settings.initial_capacity,
            "symbol cache created"
        );
        Self {
            shards,
            mask: count - 1,
            clock,
            ttl_ms: settings.ttl_ms,
        }
    }

    #[inline]
    fn shard(&self, hash: u32) -> &SymbolShard {
        &self.shards[hash as usize & self.mask]
    }

    /// Resolves a symbol from a buffer carrying an embedded key header,
    /// storing it weakly if absent. No string is built on a hit.
    ///
    /// Fails when the buffer is not a well-formed key or, on a miss, when the
    /// embedded hash disagrees with the payload.
    pub fn resolve_key(&self, buf: &[u16]) -> Result<Symbol> {
        let units = payload_from_key(buf)?;
        let hash = hash_from_key(buf)?;
        let key = SymbolKey::Units { units, hash };
        self.shard(hash).resolve(&key, self.clock.as_ref(), |now| {
            Entry::weak_from_key(units, hash, now)
        })
    }

    /// Resolves `symbol` to its canonical instance, storing it weakly if absent.
    pub fn resolve(&self, symbol: &str) -> Symbol {
        let key = SymbolKey::for_str(symbol);
        let resolved = self.shard(key.hash()).resolve(&key, self.clock.as_ref(), |now| {
            Ok::<_, Infallible>(Entry::weak(Symbol::from(symbol), now))
        });
        match resolved {
            Ok(found) => found,
            Err(never) => match never {},
        }
    }

    /// Canonical instance of `symbol` if cached; never creates or refreshes entries.
    pub fn get_if_present(&self, symbol: &str) -> Option<Symbol> {
        let key = SymbolKey::for_str(symbol);
        self.shard(key.hash()).get_if_present(&key)
    }

    /// Like [`get_if_present`](Self::get_if_present) for an embedded key buffer.
    pub fn get_if_present_key(&self, buf: &[u16]) -> Result<Option<Symbol>> {
        let key = SymbolKey::from_key(buf)?;
        Ok(self.shard(key.hash()).get_if_present(&key))
    }

    /// Resolves `symbol` and increments its reference count.
    pub fn acquire(&self, symbol: &str) -> Symbol {
        let key = SymbolKey::for_str(symbol);
        self.shard(key.hash()).acquire(&key, symbol)
    }

    /// Decrements the reference count of `symbol`; the last release starts its TTL.
    ///
    /// Fails with [`CacheError::IllegalRefCount`](crate::CacheError::IllegalRefCount)
    /// when `symbol` is not strongly held.
    pub fn release(&self, symbol: &str) -> Result<()> {
        let key = SymbolKey::for_str(symbol);
        self.shard(key.hash()).release(&key, symbol, self.clock.as_ref())
    }

    /// Evicts weak entries whose TTL has elapsed. Returns the number evicted.
    pub fn clean_up(&self) -> usize {
        // Nothing can be due before the clock has run for a full TTL.
        let Some(cutoff) = self.clock.millis().checked_sub(self.ttl_ms) else {
            return 0;
        };
        let evicted: usize = self.shards.iter().map(|s| s.clean_up(cutoff)).sum();
        if evicted > 0 {
            tracing::debug!(evicted, cutoff, "symbol cache swept");
        }
        evicted
    }

    /// Removes every entry, including strongly held ones.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
        tracing::debug!("symbol cache cleared");
    }

    /// Number of entries, including tombstones not yet swept.
    pub fn len(&self) -> usize {
        self.shards.iter().map(SymbolShard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(SymbolShard::is_empty)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}
