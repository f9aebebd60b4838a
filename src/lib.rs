//! symbol-cache: a sharded, thread-safe interning cache that maps every
//! occurrence of a symbol to one canonical `Arc<str>` instance.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: collapse repeated market-data symbols into a single shared
//!   instance, so downstream code can compare by identity and the pipeline
//!   stops allocating a `String` per record.
//! - Layers:
//!   - `key`: embeds length and hash into the head of a raw UTF-16 buffer so
//!     a decoder can look a symbol up before it ever builds a `String`.
//!   - `Entry`: one symbol plus a packed `AtomicU64` liveness word (strong
//!     refcount, weak last-touch time, or removed).
//!   - `EntryTable`: slotmap storage indexed by a hashbrown `HashTable`
//!     keyed on stored hashes, with generational handles.
//!   - `SymbolShard`: an `EntryTable` published as an `ArcSwap` snapshot;
//!     writers copy, edit and republish it under a `parking_lot::Mutex`.
//!   - `SymbolCache`: a power-of-two array of shards and the public API.
//!
//! Storage modes
//! - Weak: `resolve`/`resolve_key` keep an entry for a TTL after its last
//!   touch. Eviction is sweep-based: `clean_up` must be called periodically
//!   by the owner.
//! - Strong: `acquire` pins an entry until the matching `release`; pinned
//!   entries are never swept. The last release demotes to weak.
//!
//! Concurrency
//! - No global lock, and no lock at all on the fast path: a hit loads the
//!   shard's current snapshot and updates only the target entry's atomic
//!   word, so it never waits for a writer.
//! - The writer mutex is taken only to admit a new symbol, replace a
//!   removed entry, unlink swept entries, or clear. The clock is read before
//!   it is taken.
//! - A removed entry is terminal; re-admission always builds a new entry, so
//!   a stale reader can never revive it.
//! - Acquire beats expiry: incrementing a weak entry turns it strong with a
//!   count of one, discarding its timestamp.
//!
//! Clock
//! - Weak timestamps only move forward. A clock that steps backwards
//!   neither shortens nor extends an entry's life.
//!
//! Errors
//! - All failures are contract violations reported as `CacheError`: a
//!   malformed key buffer, an embedded hash that disagrees with its payload,
//!   an invalid configuration, or a release without a matching acquire.
//!
//! Notes and non-goals
//! - Only canonical strings are cached; there is no value payload.
//! - No persistence, no cross-process sharing, no background threads.
//! - Expiry is approximate: an entry lives between TTL and TTL plus one
//!   sweep interval after its last touch.

mod cache;
pub mod clock;
pub mod config;
mod entry;
mod error;
pub mod key;
mod shard;
mod symbol;
mod table;

// Public surface
pub use cache::SymbolCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheSettings, SymbolCacheBuilder, MAX_SHARDS};
pub use error::{CacheError, Result};
pub use key::{embed_key, embed_str, is_key, KEY_HEADER_SIZE};
pub use symbol::Symbol;
