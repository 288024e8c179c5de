use std::{
    collections::{HashMap, VecDeque},
    fmt::Debug,
    hash::Hash,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Outcome of an insertion.
///
/// When the key was already present, `existing` holds the resident value and
/// the caller's copy is dropped. Otherwise the value was admitted and
/// `evicted` holds the cold entries pushed out to make room; committing them
/// is the caller's duty. The cache itself never writes anything.
pub struct Added<K, V> {
    pub existing: Option<V>,
    pub evicted: Vec<(K, V)>,
}

/// A bounded associative store with least-recently-used eviction.
///
/// Eviction hands cold entries back to the caller instead of invoking a
/// callback into the persistence layer, so the cache lock is never held
/// while anyone does I/O and the cache has no dependency on persistence.
pub struct Cache<K, V>
where
    K: PartialEq + Eq + Hash + Clone + Debug,
    V: Clone,
{
    capacity: usize,
    /// Map of all resident entries.
    entries: HashMap<K, V>,
    /// Recency queue, coldest at the front.
    recency: VecDeque<K>,
    /// stats
    stats: Stats,
}

impl<K, V> Cache<K, V>
where
    K: PartialEq + Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Cache {
            capacity,
            entries: HashMap::new(),
            recency: VecDeque::new(),
            stats: Stats::new(),
        }
    }

    /// Inserts a new entry. If the key is already present the resident value
    /// wins and is returned in `Added::existing`; otherwise the entry is
    /// admitted and any entries evicted to honor the capacity are returned.
    pub fn insert(&mut self, key: K, value: V) -> Added<K, V> {
        if let Some(existing) = self.entries.get(&key) {
            let existing = existing.clone();
            self.touch(&key);
            return Added {
                existing: Some(existing),
                evicted: Vec::new(),
            };
        }

        self.entries.insert(key.clone(), value);
        self.recency.push_back(key);

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some(cold) = self.recency.pop_front() else {
                break;
            };
            if let Some(value) = self.entries.remove(&cold) {
                evicted.push((cold, value));
            }
        }

        Added {
            existing: None,
            evicted,
        }
    }

    /// Returns the value for the given key if resident, updating recency.
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(value) = self.entries.get(key) {
            let value = value.clone();
            self.touch(key);
            self.stats.hit();
            Some(value)
        } else {
            self.stats.miss();
            None
        }
    }

    /// Removes and returns the entry for the given key.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.recency.retain(|k| k != key);
        Some(value)
    }

    /// Marks the entry as recently used without fetching it. Returns false
    /// on a miss.
    pub fn touch(&mut self, key: &K) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        self.recency.retain(|k| k != key);
        self.recency.push_back(key.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        self.stats.get()
    }
}

struct Stats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Stats {
    fn new() -> Self {
        Stats {
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::SeqCst),
            self.misses.load(Ordering::SeqCst),
        )
    }
}
