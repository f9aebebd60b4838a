//! Entry: one interned symbol and its liveness word.
//!
//! The whole state lives in a single `AtomicU64`:
//!
//! - `TTL_BIT` set: weak entry, low 63 bits hold the last-touch time (ms).
//! - `TTL_BIT` clear and non-zero: strong entry, the value is the refcount.
//! - zero: removed. Terminal; the symbol must be re-admitted as a new entry.
//!
//! Every transition is a compare-and-swap loop; there are no per-entry locks.

use crate::clock::Clock;
use crate::error::{CacheError, Result};
use crate::key::{hash_units, symbol_hash};
use crate::symbol::Symbol;
use core::sync::atomic::{AtomicU64, Ordering};

const TTL_BIT: u64 = 1 << 63;
const TIME_MASK: u64 = !TTL_BIT;
const REMOVED: u64 = 0;

/// Decoded view of an entry's state word.
#[cfg(test)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryState {
    Strong(u64),
    Weak(u64),
    Removed,
}

#[derive(Debug)]
pub struct Entry {
    symbol: Symbol,
    hash: u32,
    state: AtomicU64,
}

impl Entry {
    fn new(symbol: Symbol, hash: u32, state: u64) -> Self {
        Self {
            symbol,
            hash,
            state: AtomicU64::new(state),
        }
    }

    /// Strong entry holding one reference.
    pub fn strong(symbol: Symbol) -> Self {
        let hash = symbol_hash(&symbol);
        Self::new(symbol, hash, 1)
    }

    /// Weak entry touched at `now`.
    pub fn weak(symbol: Symbol, now: u64) -> Self {
        let hash = symbol_hash(&symbol);
        Self::new(symbol, hash, TTL_BIT | (now & TIME_MASK))
    }

    /// Weak entry built from a raw payload whose hash was embedded by the producer.
    ///
    /// The payload is materialized here, so this only runs on a cache miss.
    pub fn weak_from_key(units: &[u16], hash: u32, now: u64) -> Result<Self> {
        let required = hash_units(units);
        if required != hash {
            return Err(CacheError::HashMismatch {
                given: hash,
                required,
            });
        }
        let symbol = String::from_utf16(units).map_err(|_| CacheError::InvalidUtf16)?;
        Ok(Self::new(
            Symbol::from(symbol),
            hash,
            TTL_BIT | (now & TIME_MASK),
        ))
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[inline]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    #[cfg(test)]
    pub fn state(&self) -> EntryState {
        decode(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.state.load(Ordering::Acquire) == REMOVED
    }

    #[inline]
    fn cas(&self, current: u64, new: u64) -> bool {
        self.state
            .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Adds a reference. A weak entry becomes strong with a count of one, so
    /// an acquire always wins over a pending expiry. Fails only on a removed
    /// entry, which the caller must replace.
    pub fn try_increment(&self) -> bool {
        loop {
            let s = self.state.load(Ordering::Acquire);
            if s == REMOVED {
                return false;
            }
            let next = if s & TTL_BIT != 0 { 1 } else { s + 1 };
            if next == TTL_BIT {
                // Same policy as Arc: a count this large is a leak, not a workload.
                std::process::abort();
            }
            if self.cas(s, next) {
                return true;
            }
        }
    }

    /// Drops a reference; the last one demotes the entry to weak at the
    /// current time. Fails when the entry is not strong, i.e. on a release
    /// without a matching acquire.
    pub fn try_decrement(&self, clock: &dyn Clock) -> bool {
        loop {
            let s = self.state.load(Ordering::Acquire);
            if s & TTL_BIT != 0 || s == REMOVED {
                return false;
            }
            let next = if s == 1 {
                TTL_BIT | (clock.millis() & TIME_MASK)
            } else {
                s - 1
            };
            if self.cas(s, next) {
                return true;
            }
        }
    }

    /// Refreshes a weak entry's timestamp. Strong entries need no refresh.
    ///
    /// The timestamp only moves forward: an earlier clock reading leaves the
    /// entry untouched but still counts as a hit. The clock is read at most
    /// once and only for weak entries.
    pub fn try_touch(&self, clock: &dyn Clock) -> bool {
        self.touch_with(|| clock.millis())
    }

    /// Like [`try_touch`](Self::try_touch) with a time read beforehand.
    pub fn try_touch_at(&self, now: u64) -> bool {
        self.touch_with(|| now)
    }

    fn touch_with(&self, read: impl Fn() -> u64) -> bool {
        let mut now = None;
        loop {
            let s = self.state.load(Ordering::Acquire);
            if s == REMOVED {
                return false;
            }
            if s & TTL_BIT == 0 {
                return true;
            }
            let time = *now.get_or_insert_with(|| read() & TIME_MASK);
            if time <= s & TIME_MASK || self.cas(s, TTL_BIT | time) {
                return true;
            }
        }
    }

    /// Tombstones a weak entry last touched at or before `cutoff`.
    ///
    /// A single attempt: a concurrent touch or acquire that wins the race
    /// keeps the entry alive until the next sweep. Returns true when this
    /// call removed the entry.
    pub fn expire_if_due(&self, cutoff: u64) -> bool {
        let s = self.state.load(Ordering::Acquire);
        if s & TTL_BIT == 0 || s & TIME_MASK > cutoff {
            return false;
        }
        self.state
            .compare_exchange(s, REMOVED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
fn decode(s: u64) -> EntryState {
    if s == REMOVED {
        EntryState::Removed
    } else if s & TTL_BIT != 0 {
        EntryState::Weak(s & TIME_MASK)
    } else {
        EntryState::Strong(s)
    }
}
