//! Registry of finished compilations.
//!
//! The driver publishes a [`CompiledMethod`] here only after every
//! stage succeeded, so a cache entry is always complete and callable.
//! Lookups are concurrent; dispatch threads hold the shared handle
//! while an invalidation can drop the entry from the map, so the code
//! stays alive until its last caller lets go.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use std::fmt;

use crate::driver::CompiledMethod;

/// Process-wide identity of a compilable method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Counter snapshot for profiling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

/// Thread-safe map from method id to its compiled code.
#[derive(Debug, Default)]
pub struct CodeCache {
    map: RwLock<FxHashMap<MethodId, Arc<CompiledMethod>>>,

    /// Lookup counters, relaxed; exact totals are not load-bearing.
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

impl CodeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the published compilation for `id`.
    pub fn lookup(&self, id: MethodId) -> Option<Arc<CompiledMethod>> {
        let map = self.map.read().unwrap();
        if let Some(method) = map.get(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(Arc::clone(method))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Publish a finished compilation, returning the shared handle. A
    /// previous entry under the same id is evicted; callers already
    /// holding its handle keep running the old code.
    pub fn insert(&self, id: MethodId, method: CompiledMethod) -> Arc<CompiledMethod> {
        let method = Arc::new(method);
        let previous = {
            let mut map = self.map.write().unwrap();
            map.insert(id, Arc::clone(&method))
        };
        self.insertions.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        method
    }

    /// Drop the entry for `id`, reporting whether one was present.
    pub fn invalidate(&self, id: MethodId) -> bool {
        let removed = self.map.write().unwrap().remove(&id).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut map = self.map.write().unwrap();
        self.evictions.fetch_add(map.len() as u64, Ordering::Relaxed);
        map.clear();
    }

    #[must_use]
    pub fn contains(&self, id: MethodId) -> bool {
        self.map.read().unwrap().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::x86::{Machine, RunOutcome};
    use crate::driver::MethodCompiler;
    use crate::ir::{Bci, CallKind, ClassRef, FieldRef, MethodIr, MethodRef, Operand, QuadKind};
    use crate::runtime::{
        Dispatch, FieldStorage, MethodMetadata, MethodSite, TargetConfig,
    };
    use garnet_core::{JitResult, ValueType};

    struct PlainMeta;

    impl MethodMetadata for PlainMeta {
        fn bytecode(&self) -> &[u8] {
            &[]
        }
        fn arg_words(&self) -> u16 {
            0
        }
        fn return_type(&self) -> Option<ValueType> {
            Some(ValueType::Int)
        }
        fn field_storage(&self, _field: FieldRef) -> JitResult<FieldStorage> {
            Ok(FieldStorage::Instance { offset: 16 })
        }
        fn method_site(&self, _kind: CallKind, _method: MethodRef) -> JitResult<MethodSite> {
            Ok(MethodSite {
                arg_words: 0,
                return_type: None,
                dispatch: Dispatch::Direct { entry_cell: 0x2000 },
            })
        }
        fn class_handle(&self, _class: ClassRef) -> JitResult<i32> {
            Ok(0x41)
        }
    }

    // return k
    fn const_method(k: i32) -> CompiledMethod {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::int(k))),
            },
        );
        MethodCompiler::new(TargetConfig::default())
            .compile(ir, &PlainMeta)
            .unwrap()
    }

    fn returned(method: &CompiledMethod) -> i32 {
        let mut machine = Machine::new();
        match machine.call(&method.code, &[]) {
            RunOutcome::Returned { eax, .. } => eax,
            other => panic!("expected a return, got {other:?}"),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = CodeCache::new();
        let id = MethodId(7);

        assert!(cache.lookup(id).is_none());
        cache.insert(id, const_method(11));
        let found = cache.lookup(id).expect("published entry");
        assert_eq!(returned(&found), 11);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_reinsert_evicts_but_old_handles_survive() {
        let cache = CodeCache::new();
        let id = MethodId(3);

        let old = cache.insert(id, const_method(1));
        cache.insert(id, const_method(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
        // The replaced code is still runnable through the old handle.
        assert_eq!(returned(&old), 1);
        assert_eq!(returned(&cache.lookup(id).unwrap()), 2);
    }

    #[test]
    fn test_invalidate_removes_one_entry() {
        let cache = CodeCache::new();
        cache.insert(MethodId(1), const_method(1));
        cache.insert(MethodId(2), const_method(2));

        assert!(cache.invalidate(MethodId(1)));
        assert!(!cache.invalidate(MethodId(1)));
        assert!(!cache.contains(MethodId(1)));
        assert!(cache.contains(MethodId(2)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_clear_counts_every_entry_evicted() {
        let cache = CodeCache::new();
        for i in 0..4 {
            cache.insert(MethodId(i), const_method(i as i32));
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 4);
    }

    #[test]
    fn test_concurrent_lookups_share_one_entry() {
        let cache = Arc::new(CodeCache::new());
        let id = MethodId(9);
        cache.insert(id, const_method(99));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                let method = cache.lookup(id).expect("published entry");
                returned(&method)
            }));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 99);
        }
        assert_eq!(cache.stats().hits, 4);
    }

    #[test]
    fn test_method_id_display() {
        assert_eq!(MethodId(12).to_string(), "m12");
    }
}
