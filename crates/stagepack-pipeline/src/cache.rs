//! Incremental stage cache
//!
//! Per-file stage work is a pure function of the stage, the file path, the file
//! content and a per-invocation context digest. Outputs are stored under the
//! SHA-256 of those four inputs and reused by later builds of the same
//! `Pipeline`.

use ahash::AHashMap;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type Fingerprint = [u8; 32];

/// Fingerprint of one unit of stage work
pub fn fingerprint(stage: &str, path: &str, content: &[u8], context: &Fingerprint) -> Fingerprint {
    let mut hasher = Sha256::new();
    for part in [stage.as_bytes(), path.as_bytes(), content] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.update(context);
    hasher.finalize().into()
}

/// Incremental digest builder for stage contexts
#[derive(Debug, Clone, Default)]
pub struct ContextDigest {
    hasher: Sha256,
}

impl ContextDigest {
    pub fn new() -> Self {
        ContextDigest::default()
    }

    pub fn add(&mut self, part: impl AsRef<[u8]>) -> &mut Self {
        let part = part.as_ref();
        self.hasher.update((part.len() as u64).to_le_bytes());
        self.hasher.update(part);
        self
    }

    pub fn finish(&self) -> Fingerprint {
        self.hasher.clone().finalize().into()
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Stage outputs keyed by fingerprint, shared across builds of one pipeline
#[derive(Debug, Default)]
pub struct StageCache {
    entries: RwLock<AHashMap<Fingerprint, Arc<[u8]>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl StageCache {
    pub fn new() -> Self {
        StageCache::default()
    }

    /// Cached output for `key`, or compute and remember it
    pub fn get_or_compute<E, F>(&self, key: Fingerprint, compute: F) -> Result<Arc<[u8]>, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        if let Some(hit) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(hit));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let output: Arc<[u8]> = Arc::from(compute()?);
        self.entries.write().insert(key, Arc::clone(&output));
        Ok(output)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_separates_fields() {
        let ctx = ContextDigest::new().finish();
        assert_ne!(
            fingerprint("resolve", "ab", b"c", &ctx),
            fingerprint("resolve", "a", b"bc", &ctx)
        );
        let other_ctx = ContextDigest::new().add("static").finish();
        assert_ne!(
            fingerprint("resolve", "a", b"b", &ctx),
            fingerprint("resolve", "a", b"b", &other_ctx)
        );
    }

    #[test]
    fn test_get_or_compute_reuses_output() -> anyhow::Result<()> {
        let cache = StageCache::new();
        let key = fingerprint("templates", "x.hbs", b"<div/>", &ContextDigest::new().finish());
        let first = cache.get_or_compute(key, || Ok::<_, anyhow::Error>(b"out".to_vec()))?;
        let second = cache.get_or_compute(key, || Err(anyhow::anyhow!("not recomputed")))?;
        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        Ok(())
    }
}
