use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use moka::sync::Cache;
use tracing::debug;

use crate::compiler::{CompileStrictness, SchemaBundle};
use crate::error::{Result, ValidationError};
use crate::schema_loader::LoadPolicySet;

/// Default number of compiled bundles kept in memory.
pub const DEFAULT_MAX_BUNDLES: u64 = 64;

static GLOBAL_CACHE: OnceLock<Arc<BundleCache>> = OnceLock::new();

/// Identifies one compiled bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleKey {
    pub directory: PathBuf,
    pub policies: LoadPolicySet,
    pub strictness: CompileStrictness,
}

impl BundleKey {
    /// The directory is canonicalized when possible so that different
    /// spellings of one path share an entry.
    pub fn new(directory: &Path, policies: LoadPolicySet, strictness: CompileStrictness) -> Self {
        let directory = directory
            .canonicalize()
            .unwrap_or_else(|_| directory.to_path_buf());

        Self {
            directory,
            policies,
            strictness,
        }
    }
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

/// Thread-safe cache of compiled schema bundles.
///
/// Concurrent requests for a missing key wait for a single compilation.
/// Entries never expire; they are only dropped when the capacity is
/// exceeded or the cache is cleared.
pub struct BundleCache {
    cache: Cache<BundleKey, Arc<SchemaBundle>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BundleCache {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The process-wide cache, created on first use.
    pub fn global() -> Arc<BundleCache> {
        GLOBAL_CACHE
            .get_or_init(|| Arc::new(BundleCache::new(DEFAULT_MAX_BUNDLES)))
            .clone()
    }

    /// Get a bundle from the cache, or build it if missing.
    ///
    /// `build` only runs when the key is absent. A failed build is not
    /// cached, so a later call retries.
    pub fn get_or_compile<F>(&self, key: BundleKey, build: F) -> Result<Arc<SchemaBundle>>
    where
        F: FnOnce() -> Result<SchemaBundle>,
    {
        let mut compiled_here = false;
        let directory = key.directory.clone();

        let result = self.cache.try_get_with(key, || {
            compiled_here = true;
            build().map(Arc::new)
        });

        if compiled_here {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(directory = %directory.display(), "Schema bundle cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(directory = %directory.display(), "Schema bundle cache hit");
        }

        result.map_err(unshare_error)
    }

    pub fn get(&self, key: &BundleKey) -> Option<Arc<SchemaBundle>> {
        self.cache.get(key)
    }

    pub fn contains(&self, key: &BundleKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

impl Default for BundleCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUNDLES)
    }
}

/// moka shares one error between every waiter on a key. The first owner
/// gets it back intact; other waiters get an equivalent copy.
fn unshare_error(err: Arc<ValidationError>) -> ValidationError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match shared.as_ref() {
        ValidationError::SchemaAssemblyFailed { directory, details } => {
            ValidationError::SchemaAssemblyFailed {
                directory: directory.clone(),
                details: details.clone(),
            }
        }
        ValidationError::SchemaCompileFailed { path, details } => {
            ValidationError::SchemaCompileFailed {
                path: path.clone(),
                details: details.clone(),
            }
        }
        ValidationError::FileSystemTraversal { path, reason } => {
            ValidationError::FileSystemTraversal {
                path: path.clone(),
                reason: reason.clone(),
            }
        }
        other => ValidationError::Cache(other.to_string()),
    })
}
