use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// A bounded LRU cache of compiled statements keyed by their text.
///
/// Entries are handed out as [`Arc`]s, so evicting an entry never invalidates a statement a
/// caller still holds. A capacity of zero disables caching.
pub struct StatementCache<T> {
    entries: Option<Mutex<LruCache<String, Arc<T>>>>,
}

impl<T> StatementCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Returns the cached statement for `text` or compiles and caches it.
    ///
    /// Compilation errors are not cached.
    pub fn get_or_compile<E>(
        &self,
        text: &str,
        compile: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let Some(entries) = &self.entries else {
            return compile(text).map(Arc::new);
        };
        let key = normalize(text);
        if let Some(statement) = entries.lock().get(key) {
            debug!(statement = key, "Statement cache hit");
            return Ok(Arc::clone(statement));
        }

        debug!(statement = key, "Statement cache miss");
        // Compiled outside of the lock, two threads may race to compile the same text.
        let statement = Arc::new(compile(text)?);
        if let Some((evicted, _)) = entries
            .lock()
            .push(key.to_owned(), Arc::clone(&statement))
            .filter(|(evicted, _)| evicted != key)
        {
            debug!(statement = evicted.as_str(), "Statement cache eviction");
        }
        Ok(statement)
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(entries) = &self.entries {
            entries.lock().clear();
        }
    }
}

fn normalize(text: &str) -> &str {
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn repeated_texts_are_compiled_once() {
        let cache = StatementCache::new(2);
        let compilations = Cell::new(0);
        let compile = |text: &str| -> Result<String, ()> {
            compilations.set(compilations.get() + 1);
            Ok(text.to_owned())
        };
        let first = cache.get_or_compile("SELECT 1", compile).unwrap();
        let second = cache.get_or_compile("  SELECT 1\n", compile).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compilations.get(), 1);
    }

    #[test]
    fn eviction_keeps_held_statements_alive() {
        let cache = StatementCache::new(1);
        let held = cache
            .get_or_compile("a", |text| Ok::<_, ()>(text.to_owned()))
            .unwrap();
        cache
            .get_or_compile("b", |text| Ok::<_, ()>(text.to_owned()))
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(held.as_str(), "a");
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = StatementCache::<String>::new(4);
        assert!(cache.get_or_compile("bad", |_| Err("syntax")).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = StatementCache::new(0);
        let first = cache
            .get_or_compile("a", |text| Ok::<_, ()>(text.to_owned()))
            .unwrap();
        let second = cache
            .get_or_compile("a", |text| Ok::<_, ()>(text.to_owned()))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.is_empty());
    }
}
