//! SymbolShard: one partition of the cache and its synchronization domain.
//!
//! The shard publishes its [`EntryTable`] as an immutable snapshot behind an
//! `ArcSwap`. Fast path: load the snapshot, find the entry and update its
//! state word with a CAS. No lock is taken, so a hit never waits for a
//! writer, and two threads hitting different live symbols only ever touch
//! their own entries.
//!
//! Slow path: taken only when the symbol is missing or its entry was
//! tombstoned. The clock is read and the new entry built first; then, under
//! the shard's writer mutex, the lookup is repeated against the latest
//! snapshot, a live entry is reused if one appeared meanwhile, otherwise a
//! copy of the table is edited (tombstone unlinked, entry inserted) and
//! published. Writers always start from the latest snapshot, so no update
//! is lost.

use crate::clock::Clock;
use crate::entry::Entry;
use crate::error::{CacheError, Result};
use crate::key::SymbolKey;
use crate::symbol::Symbol;
use crate::table::{EntryTable, Handle};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
pub struct SymbolShard {
    index: ArcSwap<EntryTable>,
    writer: Mutex<()>,
}

impl Default for SymbolShard {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl SymbolShard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: ArcSwap::from_pointee(EntryTable::with_capacity(capacity)),
            writer: Mutex::new(()),
        }
    }

    /// Returns the canonical symbol for `key`, admitting the entry built by
    /// `admit` (a weak entry stamped with the given time) if none is live.
    pub(crate) fn resolve<E>(
        &self,
        key: &SymbolKey<'_>,
        clock: &dyn Clock,
        admit: impl FnOnce(u64) -> std::result::Result<Entry, E>,
    ) -> std::result::Result<Symbol, E> {
        {
            let snapshot = self.index.load();
            if let Some(e) = snapshot.find_entry(key) {
                if e.try_touch(clock) {
                    return Ok(e.symbol().clone());
                }
            }
        }
        self.resolve_slow(key, clock, admit)
    }

    #[cold]
    fn resolve_slow<E>(
        &self,
        key: &SymbolKey<'_>,
        clock: &dyn Clock,
        admit: impl FnOnce(u64) -> std::result::Result<Entry, E>,
    ) -> std::result::Result<Symbol, E> {
        let now = clock.millis();
        let entry = admit(now)?;
        Ok(self.revive_or_insert(key, |e| e.try_touch_at(now), entry))
    }

    /// Returns the canonical symbol for `symbol` with one more strong reference.
    pub(crate) fn acquire(&self, key: &SymbolKey<'_>, symbol: &str) -> Symbol {
        {
            let snapshot = self.index.load();
            if let Some(e) = snapshot.find_entry(key) {
                if e.try_increment() {
                    return e.symbol().clone();
                }
            }
        }
        self.acquire_slow(key, symbol)
    }

    #[cold]
    fn acquire_slow(&self, key: &SymbolKey<'_>, symbol: &str) -> Symbol {
        let entry = Entry::strong(Symbol::from(symbol));
        self.revive_or_insert(key, Entry::try_increment, entry)
    }

    /// Slow-path re-check under the writer mutex. Returns the live entry's
    /// symbol when `revive` succeeds on it; otherwise publishes a copy of the
    /// table with the tombstone (if any) replaced by `entry`.
    fn revive_or_insert(
        &self,
        key: &SymbolKey<'_>,
        revive: impl FnOnce(&Entry) -> bool,
        entry: Entry,
    ) -> Symbol {
        let _writer = self.writer.lock();
        let current = self.index.load_full();
        let found = current.find(key);
        if let Some(e) = found.and_then(|h| current.get(h)) {
            if revive(e) {
                return e.symbol().clone();
            }
            tracing::trace!(symbol = %e.symbol(), "replacing removed entry");
        }
        let mut next = EntryTable::clone(&current);
        if let Some(h) = found {
            next.remove(h);
        }
        let symbol = entry.symbol().clone();
        next.insert_unique(entry);
        self.index.store(Arc::new(next));
        symbol
    }

    /// Drops one strong reference; an unmatched release is reported, never absorbed.
    pub(crate) fn release(&self, key: &SymbolKey<'_>, symbol: &str, clock: &dyn Clock) -> Result<()> {
        let snapshot = self.index.load();
        match snapshot.find_entry(key) {
            Some(e) if e.try_decrement(clock) => Ok(()),
            _ => Err(CacheError::IllegalRefCount {
                symbol: symbol.to_string(),
            }),
        }
    }

    pub(crate) fn get_if_present(&self, key: &SymbolKey<'_>) -> Option<Symbol> {
        self.index
            .load()
            .find_entry(key)
            .filter(|e| !e.is_removed())
            .map(|e| e.symbol().clone())
    }

    /// Expires weak entries touched at or before `cutoff` and unlinks every
    /// tombstone found. Returns the number of entries unlinked.
    pub fn clean_up(&self, cutoff: u64) -> usize {
        let dead: Vec<Handle> = self
            .index
            .load()
            .iter()
            .filter_map(|(h, e)| {
                e.expire_if_due(cutoff);
                e.is_removed().then_some(h)
            })
            .collect();
        if dead.is_empty() {
            return 0;
        }

        let _writer = self.writer.lock();
        let mut next = EntryTable::clone(&self.index.load_full());
        let mut unlinked = 0;
        for h in dead {
            // The slow path may have replaced the tombstone already; its
            // handle then no longer resolves.
            if next.get(h).map_or(false, Entry::is_removed) {
                next.remove(h);
                unlinked += 1;
            }
        }
        if unlinked > 0 {
            self.index.store(Arc::new(next));
        }
        unlinked
    }

    pub fn clear(&self) {
        let _writer = self.writer.lock();
        self.index.store(Arc::new(EntryTable::new()));
    }

    pub fn len(&self) -> usize {
        self.index.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entry::EntryState;
    use crate::key::{embed_str, hash_from_key};

    fn resolve(shard: &SymbolShard, s: &str, clock: &dyn Clock) -> Symbol {
        let admitted = shard.resolve(&SymbolKey::for_str(s), clock, |now| {
            Ok::<_, CacheError>(Entry::weak(Symbol::from(s), now))
        });
        admitted.unwrap()
    }

    fn resolve_buf(shard: &SymbolShard, buf: &[u16], clock: &dyn Clock) -> Result<Symbol> {
        let key = SymbolKey::from_key(buf)?;
        let (units, hash) = match key {
            SymbolKey::Units { units, hash } => (units, hash),
            SymbolKey::Str { .. } => unreachable!(),
        };
        shard.resolve(&key, clock, |now| Entry::weak_from_key(units, hash, now))
    }

    fn acquire(shard: &SymbolShard, s: &str) -> Symbol {
        shard.acquire(&SymbolKey::for_str(s), s)
    }

    fn release(shard: &SymbolShard, s: &str, clock: &dyn Clock) -> Result<()> {
        shard.release(&SymbolKey::for_str(s), s, clock)
    }

    fn state(shard: &SymbolShard, s: &str) -> Option<EntryState> {
        shard
            .index
            .load()
            .find_entry(&SymbolKey::for_str(s))
            .map(Entry::state)
    }

    /// Invariant: repeated resolves return the same instance and refresh the timestamp.
    #[test]
    fn resolve_is_canonical_and_refreshes() {
        let clock = ManualClock::new(10);
        let shard = SymbolShard::default();
        let a = resolve(&shard, "AAPL", &clock);
        clock.set(60);
        let b = resolve(&shard, "AAPL", &clock);
        assert!(Symbol::ptr_eq(&a, &b));
        assert_eq!(state(&shard, "AAPL"), Some(EntryState::Weak(60)));
        assert_eq!(shard.len(), 1);
    }

    /// Invariant: a buffer key and a string resolve to the same instance.
    #[test]
    fn buffer_and_string_share_identity() {
        let clock = ManualClock::new(0);
        let shard = SymbolShard::default();
        let buf = embed_str("EUR/USD");
        let a = resolve_buf(&shard, &buf, &clock).unwrap();
        let b = resolve(&shard, "EUR/USD", &clock);
        assert!(Symbol::ptr_eq(&a, &b));
    }

    /// Invariant: a corrupt embedded hash fails on admission and leaves nothing behind.
    #[test]
    fn hash_mismatch_fails_on_admission() {
        let clock = ManualClock::new(0);
        let shard = SymbolShard::default();
        let mut buf = embed_str("BAD");
        buf[5] ^= 1;
        assert_ne!(hash_from_key(&buf), Ok(crate::key::symbol_hash("BAD")));
        let err = resolve_buf(&shard, &buf, &clock).unwrap_err();
        assert!(matches!(err, CacheError::HashMismatch { .. }));
        assert!(shard.is_empty());
    }

    /// Invariant: a tombstoned entry is replaced by a new instance, never revived.
    #[test]
    fn tombstone_is_replaced_with_new_instance() {
        let clock = ManualClock::new(0);
        let shard = SymbolShard::default();
        let a = resolve(&shard, "IBM", &clock);
        {
            let table = shard.index.load();
            let e = table.find_entry(&SymbolKey::for_str("IBM")).unwrap();
            assert!(e.expire_if_due(0));
        }
        assert!(shard.get_if_present(&SymbolKey::for_str("IBM")).is_none());
        let b = resolve(&shard, "IBM", &clock);
        assert!(!Symbol::ptr_eq(&a, &b));
        assert_eq!(shard.len(), 1);
        assert_eq!(state(&shard, "IBM"), Some(EntryState::Weak(0)));

        // Same through acquire.
        {
            let table = shard.index.load();
            let e = table.find_entry(&SymbolKey::for_str("IBM")).unwrap();
            assert!(e.expire_if_due(0));
        }
        let c = acquire(&shard, "IBM");
        assert!(!Symbol::ptr_eq(&b, &c));
        assert_eq!(state(&shard, "IBM"), Some(EntryState::Strong(1)));
    }

    #[test]
    fn acquire_release_round_trip() {
        let clock = ManualClock::new(5);
        let shard = SymbolShard::default();
        let a = acquire(&shard, "MSFT");
        let b = acquire(&shard, "MSFT");
        assert!(Symbol::ptr_eq(&a, &b));
        assert_eq!(state(&shard, "MSFT"), Some(EntryState::Strong(2)));
        release(&shard, "MSFT", &clock).unwrap();
        release(&shard, "MSFT", &clock).unwrap();
        assert_eq!(state(&shard, "MSFT"), Some(EntryState::Weak(5)));
        let err = release(&shard, "MSFT", &clock).unwrap_err();
        assert_eq!(
            err,
            CacheError::IllegalRefCount {
                symbol: "MSFT".to_string()
            }
        );
        assert!(release(&shard, "NOPE", &clock).unwrap_err().is_illegal_state());
    }

    /// Invariant: peeking never creates entries nor changes state.
    #[test]
    fn get_if_present_is_pure() {
        let clock = ManualClock::new(3);
        let shard = SymbolShard::default();
        assert!(shard.get_if_present(&SymbolKey::for_str("X")).is_none());
        assert!(shard.is_empty());
        let a = resolve(&shard, "X", &clock);
        clock.set(100);
        let p = shard.get_if_present(&SymbolKey::for_str("X")).unwrap();
        assert!(Symbol::ptr_eq(&a, &p));
        assert_eq!(state(&shard, "X"), Some(EntryState::Weak(3)));
    }

    /// Invariant: the sweep removes only due weak entries, never strong ones.
    #[test]
    fn clean_up_evicts_due_weak_only() {
        let clock = ManualClock::new(100);
        let shard = SymbolShard::default();
        resolve(&shard, "OLD", &clock);
        acquire(&shard, "PINNED");
        clock.set(200);
        resolve(&shard, "NEW", &clock);

        assert_eq!(shard.clean_up(150), 1);
        assert!(shard.get_if_present(&SymbolKey::for_str("OLD")).is_none());
        assert!(shard.get_if_present(&SymbolKey::for_str("NEW")).is_some());
        assert!(shard.get_if_present(&SymbolKey::for_str("PINNED")).is_some());
        assert_eq!(shard.len(), 2);

        assert_eq!(shard.clean_up(u64::MAX >> 1), 1);
        assert_eq!(shard.len(), 1);
        assert_eq!(state(&shard, "PINNED"), Some(EntryState::Strong(1)));
    }

    /// Invariant: hits, releases and peeks on live symbols never need the
    /// writer mutex. Taking it here first would deadlock any of them.
    #[test]
    fn fast_path_runs_while_writer_is_held() {
        let clock = ManualClock::new(10);
        let shard = SymbolShard::default();
        let live = resolve(&shard, "LIVE", &clock);
        let pinned = acquire(&shard, "PIN");

        let _writer = shard.writer.lock();
        clock.set(20);
        assert!(Symbol::ptr_eq(&live, &resolve(&shard, "LIVE", &clock)));
        assert_eq!(state(&shard, "LIVE"), Some(EntryState::Weak(20)));
        assert!(Symbol::ptr_eq(&pinned, &acquire(&shard, "PIN")));
        release(&shard, "PIN", &clock).unwrap();
        assert!(shard.get_if_present(&SymbolKey::for_str("LIVE")).is_some());
        assert!(release(&shard, "LIVE", &clock).is_err());
        assert_eq!(shard.len(), 2);
    }

    /// Invariant: a snapshot loaded before a write keeps its view; the next
    /// load sees the write.
    #[test]
    fn writes_publish_a_new_snapshot() {
        let clock = ManualClock::new(0);
        let shard = SymbolShard::default();
        resolve(&shard, "A", &clock);
        let before = shard.index.load_full();
        resolve(&shard, "B", &clock);
        assert_eq!(before.len(), 1);
        assert!(before.find(&SymbolKey::for_str("B")).is_none());
        assert_eq!(shard.len(), 2);
        shard.clear();
        assert_eq!(before.len(), 1);
        assert!(shard.is_empty());
    }

    #[test]
    fn clear_empties_shard() {
        let clock = ManualClock::new(0);
        let shard = SymbolShard::with_capacity(4);
        resolve(&shard, "A", &clock);
        acquire(&shard, "B");
        shard.clear();
        assert!(shard.is_empty());
        assert!(release(&shard, "B", &clock).is_err());
    }
}
