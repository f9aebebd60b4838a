//! EntryTable: structural index of entries with stable handles.
//!
//! Entries live in a `SlotMap`; a `HashTable` of slot keys indexes them by
//! the symbol hash stored in each entry. Probing accepts a borrowed
//! [`SymbolKey`], so a raw UTF-16 payload can be looked up without building a
//! `String`. Rehashing reads the stored hash and never touches symbol text.
//!
//! Handles are generational: once an entry is removed, its handle stops
//! resolving and never aliases an entry inserted later into the same slot.
//! Handles also stay valid across clones, so a handle collected from an
//! older snapshot still names the same entry in a later copy, or nothing.
//!
//! Shards never mutate a published table: a writer clones it, edits the
//! copy and publishes that. Entries are shared between copies, so a clone
//! observes every state transition made through its source.

use crate::entry::Entry;
use crate::key::SymbolKey;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

/// Spreads the 32-bit symbol hash over the full word; hashbrown takes its
/// control bytes from the top bits.
#[inline]
fn table_hash(hash: u32) -> u64 {
    u64::from(hash).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[derive(Clone, Debug, Default)]
pub struct EntryTable {
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Arc<Entry>>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn find(&self, key: &SymbolKey<'_>) -> Option<Handle> {
        let slots = &self.slots;
        self.index
            .find(table_hash(key.hash()), |&k| {
                slots
                    .get(k)
                    .map_or(false, |e| key.matches(e.symbol(), e.hash()))
            })
            .map(|&k| Handle(k))
    }

    pub(crate) fn find_entry(&self, key: &SymbolKey<'_>) -> Option<&Entry> {
        self.find(key).and_then(|h| self.get(h))
    }

    pub fn get(&self, handle: Handle) -> Option<&Entry> {
        self.slots.get(handle.0).map(Arc::as_ref)
    }

    /// Inserts without checking for an equal symbol; the caller holds the
    /// table exclusively and has already unlinked any previous entry.
    pub fn insert_unique(&mut self, entry: Entry) -> Handle {
        let hash = table_hash(entry.hash());
        let k = self.slots.insert(Arc::new(entry));
        let slots = &self.slots;
        self.index.insert_unique(hash, k, |&kk| {
            slots.get(kk).map_or(0, |e| table_hash(e.hash()))
        });
        Handle(k)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Arc<Entry>> {
        let k = handle.0;
        let entry = self.slots.remove(k)?;
        if let Ok(occupied) = self.index.find_entry(table_hash(entry.hash()), |&kk| kk == k) {
            occupied.remove();
        }
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Entry)> {
        self.slots.iter().map(|(k, e)| (Handle(k), e.as_ref()))
    }
}
