//! Weak canonicalization pool.
//!
//! A `WeakPool` hands out one shared instance per distinct value. It only
//! holds weak references, so a value leaves the pool as soon as the last
//! strong holder drops it.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};

use crate::lock;

/// Process-wide pool of canonical instances.
pub struct WeakPool<T> {
    buckets: Mutex<HashMap<u64, Vec<Weak<T>>>>,
}

impl<T: Eq + Hash> WeakPool<T> {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Return the pooled instance equal to `value`, inserting it if none is alive.
    pub fn canonicalize(&self, value: T) -> Arc<T> {
        self.canonicalize_arc(Arc::new(value))
    }

    /// Same as `canonicalize` for a value that is already shared.
    pub fn canonicalize_arc(&self, value: Arc<T>) -> Arc<T> {
        let hash = hash_of(&*value);
        let mut buckets = lock(&self.buckets);
        let bucket = buckets.entry(hash).or_default();
        bucket.retain(|weak| weak.strong_count() > 0);

        for weak in bucket.iter() {
            if let Some(existing) = weak.upgrade() {
                if *existing == *value {
                    return existing;
                }
            }
        }
        bucket.push(Arc::downgrade(&value));
        value
    }

    /// Number of live pooled instances.
    pub fn len(&self) -> usize {
        let buckets = lock(&self.buckets);
        buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the bookkeeping of instances that are no longer alive.
    pub fn purge(&self) {
        let mut buckets = lock(&self.buckets);
        buckets.retain(|_, bucket| {
            bucket.retain(|weak| weak.strong_count() > 0);
            !bucket.is_empty()
        });
    }
}

impl<T: Eq + Hash> Default for WeakPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Key(String, u32);

    #[test]
    fn test_equal_values_share_identity() {
        let pool = WeakPool::new();
        let a = pool.canonicalize(Key("sst".into(), 1));
        let b = pool.canonicalize(Key("sst".into(), 1));
        let c = pool.canonicalize(Key("sst".into(), 2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_dropped_values_leave_pool() {
        let pool = WeakPool::new();
        let a = pool.canonicalize(Key("chl".into(), 1));
        assert_eq!(pool.len(), 1);
        drop(a);
        assert!(pool.is_empty());

        pool.purge();
        let b = pool.canonicalize(Key("chl".into(), 1));
        assert_eq!(Arc::strong_count(&b), 1);
    }
}
