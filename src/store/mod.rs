pub mod entry;

use crate::scan;
use crate::types::Value;
use bytes::Bytes;
use entry::{Entry, now_millis};
use parking_lot::{Mutex, MutexGuard};
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

const SHARD_COUNT: usize = 64;
const SHARDS_PER_SWEEP: usize = 16;

type Shard = HashMap<Bytes, Entry>;

/// The shared keyspace.
///
/// Keys are spread over a fixed set of lock stripes. A command locks every
/// stripe its keys hash to, in ascending stripe order, before it reads or
/// writes anything, and holds them until its [`KeyLock`] is dropped. Two
/// commands touching the same key are therefore serialized, and multi-key
/// commands can never deadlock against each other.
pub struct Keyspace {
    shards: Vec<Mutex<Shard>>,
    sweep_cursor: AtomicUsize,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            sweep_cursor: AtomicUsize::new(0),
        }
    }

    fn shard_index(key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % SHARD_COUNT as u64) as usize
    }

    /// Lock the stripe owning a single key.
    pub fn lock(&self, key: &[u8]) -> KeyLock<'_> {
        self.lock_many(&[key])
    }

    /// Lock the stripes owning all of `keys`, in a fixed global order.
    pub fn lock_many<K: AsRef<[u8]>>(&self, keys: &[K]) -> KeyLock<'_> {
        let mut indices: Vec<usize> = keys.iter().map(|k| Self::shard_index(k.as_ref())).collect();
        indices.sort_unstable();
        indices.dedup();
        KeyLock {
            guards: indices.into_iter().map(|i| (i, self.shards[i].lock())).collect(),
        }
    }

    /// Lock every stripe, for whole-keyspace operations like FLUSHALL.
    pub fn lock_all(&self) -> KeyLock<'_> {
        KeyLock {
            guards: self.shards.iter().enumerate().map(|(i, s)| (i, s.lock())).collect(),
        }
    }

    /// Names and type names of every live key, visiting one stripe at a time.
    /// Expired keys found along the way are removed.
    pub fn snapshot_keys(&self) -> Vec<(Bytes, &'static str)> {
        let now = now_millis();
        let mut keys = Vec::new();
        for shard in &self.shards {
            let mut shard = shard.lock();
            shard.retain(|_, entry| !entry.is_expired_at(now));
            keys.extend(shard.iter().map(|(k, e)| (k.clone(), e.value.type_name())));
        }
        keys
    }

    /// Live keys whose scan position is at or past `cursor`, tagged with
    /// that position and their type name. Visits one stripe at a time.
    pub fn scan_from(&self, cursor: u64) -> Vec<(u64, (Bytes, &'static str))> {
        let now = now_millis();
        let mut keys = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock();
            keys.extend(
                shard
                    .iter()
                    .filter(|(_, e)| !e.is_expired_at(now))
                    .map(|(k, e)| (scan::position(k), (k, e)))
                    .filter(|(pos, _)| *pos >= cursor)
                    .map(|(pos, (k, e))| (pos, (k.clone(), e.value.type_name()))),
            );
        }
        keys
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = now_millis();
        self.shards
            .iter()
            .map(|s| s.lock().values().filter(|e| !e.is_expired_at(now)).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One pass of the background sweep.
    ///
    /// Visits a window of stripes, samples up to `sample` keys carrying a
    /// key- or field-level expiry in each, and removes what has elapsed.
    /// A stripe that is busy is skipped, and each key is examined under its
    /// own short lock acquisition. Returns the number of keys removed.
    pub fn active_expire_cycle(&self, sample: usize) -> usize {
        let start = self.sweep_cursor.fetch_add(SHARDS_PER_SWEEP, Ordering::Relaxed);
        let now = now_millis();
        let mut rng = rand::thread_rng();
        let mut removed = 0;

        for offset in 0..SHARDS_PER_SWEEP {
            let shard = &self.shards[(start + offset) % SHARD_COUNT];
            let candidates: Vec<Bytes> = match shard.try_lock() {
                Some(guard) => guard
                    .iter()
                    .filter(|(_, e)| e.expires_at.is_some() || e.value.has_volatile_fields())
                    .map(|(k, _)| k.clone())
                    .choose_multiple(&mut rng, sample),
                None => continue,
            };

            for key in candidates {
                let Some(mut guard) = shard.try_lock() else {
                    break;
                };
                let Some(entry) = guard.get_mut(&key) else {
                    continue;
                };
                if entry.is_expired_at(now) {
                    guard.remove(&key);
                    removed += 1;
                } else if let Value::Hash(hash) = &mut entry.value {
                    hash.purge_expired(now);
                }
            }
        }
        removed
    }
}

/// Exclusive access to the keys a command declared up front.
///
/// Every accessor performs lazy expiry first: an elapsed key is removed and
/// reported absent, and elapsed hash fields are dropped from a live hash.
pub struct KeyLock<'a> {
    guards: Vec<(usize, MutexGuard<'a, Shard>)>,
}

impl KeyLock<'_> {
    fn shard(&mut self, key: &[u8]) -> &mut Shard {
        let index = Keyspace::shard_index(key);
        match self.guards.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) => &mut self.guards[pos].1,
            Err(_) => panic!("key accessed without being locked by the command"),
        }
    }

    /// Look up a live entry.
    pub fn get(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let now = now_millis();
        let shard = self.shard(key);
        if shard.get(key).is_some_and(|e| e.is_expired_at(now)) {
            trace!(key = %String::from_utf8_lossy(key), "lazily expired key");
            shard.remove(key);
            return None;
        }
        let entry = shard.get_mut(key)?;
        if let Value::Hash(hash) = &mut entry.value {
            hash.purge_expired(now);
        }
        Some(entry)
    }

    pub fn get_value(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.get(key).map(|e| &mut e.value)
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Store an entry, replacing whatever the key held.
    pub fn insert(&mut self, key: Bytes, entry: Entry) {
        self.shard(&key).insert(key, entry);
    }

    /// Store a value with no expiry.
    pub fn set(&mut self, key: &[u8], value: Value) {
        self.insert(Bytes::copy_from_slice(key), Entry::new(value));
    }

    /// Remove a live key, returning what it held.
    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.get(key)?;
        self.shard(key).remove(key)
    }

    /// Delete the key if its aggregate value has no elements left.
    pub fn remove_if_empty(&mut self, key: &[u8]) {
        if self.get(key).is_some_and(|e| e.value.is_empty()) {
            self.shard(key).remove(key);
        }
    }

    /// Clear every locked stripe. Only meaningful after [`Keyspace::lock_all`].
    pub fn clear(&mut self) {
        for (_, shard) in &mut self.guards {
            shard.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Value {
        Value::String(s.as_bytes().to_vec())
    }

    #[test]
    fn test_set_get_remove() {
        let ks = Keyspace::new();
        let mut lock = ks.lock(b"k");
        lock.set(b"k", string("v"));
        assert!(lock.contains(b"k"));
        assert!(lock.remove(b"k").is_some());
        assert!(lock.get(b"k").is_none());
    }

    #[test]
    fn test_lazy_expiry() {
        let ks = Keyspace::new();
        let mut lock = ks.lock(b"k");
        lock.insert(Bytes::from_static(b"k"), Entry::with_expiry(string("v"), Some(now_millis() - 1)));
        assert!(lock.get(b"k").is_none());
        drop(lock);
        assert_eq!(ks.len(), 0);
    }

    #[test]
    fn test_lock_many_same_stripe_twice() {
        let ks = Keyspace::new();
        let keys: [&[u8]; 3] = [b"a", b"a", b"b"];
        let mut lock = ks.lock_many(&keys);
        lock.set(b"a", string("1"));
        lock.set(b"b", string("2"));
        drop(lock);
        assert_eq!(ks.len(), 2);
    }

    #[test]
    fn test_active_expire_removes_elapsed_keys() {
        let ks = Keyspace::new();
        for i in 0..50 {
            let key = format!("k{i}");
            let mut lock = ks.lock(key.as_bytes());
            lock.insert(Bytes::from(key), Entry::with_expiry(string("v"), Some(now_millis() - 1)));
        }
        let mut removed = 0;
        for _ in 0..(SHARD_COUNT / SHARDS_PER_SWEEP) {
            removed += ks.active_expire_cycle(100);
        }
        assert_eq!(removed, 50);
    }

    #[test]
    fn test_snapshot_keys_reports_types() {
        let ks = Keyspace::new();
        ks.lock(b"s").set(b"s", string("v"));
        let keys = ks.snapshot_keys();
        assert_eq!(keys, vec![(Bytes::from_static(b"s"), "string")]);
    }

    #[test]
    fn test_scan_from_skips_positions_before_cursor() {
        let ks = Keyspace::new();
        for name in ["a", "b", "c", "d"] {
            ks.lock(name.as_bytes()).set(name.as_bytes(), string("v"));
        }
        let all = ks.scan_from(0);
        assert_eq!(all.len(), 4);
        let cursor = all.iter().map(|(pos, _)| *pos).max().unwrap();
        let tail = ks.scan_from(cursor);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].0, cursor);
    }
}
