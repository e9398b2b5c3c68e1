use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::{CodecError, Segment};

/// A segment cache behind the mutex that makes it safely shareable.
///
/// The UUID registry hands the same cache instance to every endpoint of a
/// process that peers with the same remote, so even the single-threaded
/// deployment keeps caches behind a lock. Lock scopes are confined to
/// individual operations; nothing runs user code while holding one.
pub type SharedCache = Arc<Mutex<SegmentCache>>;

/// Locks a [`SharedCache`], recovering the guard if a panicking holder
/// poisoned it.
pub fn lock(cache: &SharedCache) -> MutexGuard<'_, SegmentCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Interning store mapping 64-bit content hashes to shared [`Segment`]s.
///
/// Entries are immutable once inserted: a hash either maps to one segment
/// forever or is vacant. An insertion that disagrees with the stored bytes
/// is a collision and is refused, leaving classification (skip vs. fatal) to
/// the caller.
#[derive(Debug)]
pub struct SegmentCache {
    uuid: Uuid,
    entries: HashMap<u64, Segment>,
}

impl SegmentCache {
    /// Creates an empty cache under a freshly generated identity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_uuid(Uuid::new_v4())
    }

    /// Creates an empty cache under the given identity.
    #[must_use]
    pub fn with_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            entries: HashMap::new(),
        }
    }

    /// Wraps the cache for sharing between endpoints.
    #[must_use]
    pub fn into_shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    /// Returns the cache identity exchanged during the greeting.
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the identity in its 16-byte wire form.
    #[inline]
    #[must_use]
    pub fn uuid_bytes(&self) -> [u8; 16] {
        *self.uuid.as_bytes()
    }

    /// Returns the segment stored under `hash`, if any.
    ///
    /// The returned clone holds its own reference to the slab; callers keep
    /// it alive for as long as they need the bytes.
    #[must_use]
    pub fn lookup(&self, hash: u64) -> Option<Segment> {
        self.entries.get(&hash).cloned()
    }

    /// Interns `segment` under `hash`.
    ///
    /// Re-entering an identical segment is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Collision`] if a different segment already owns
    /// the key; the stored entry is left untouched.
    pub fn enter(&mut self, hash: u64, segment: Segment) -> Result<(), CodecError> {
        match self.entries.entry(hash) {
            std::collections::hash_map::Entry::Occupied(existing) => {
                if existing.get() == &segment {
                    Ok(())
                } else {
                    Err(CodecError::Collision { hash })
                }
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(segment);
                Ok(())
            }
        }
    }

    /// Returns the number of interned segments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been interned yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry resolving cache identities to shared cache instances.
///
/// Each registry represents one host's view: resolving the same UUID twice
/// yields the same instance, so the two directions of a peering (and any
/// concurrent peering with the same remote) share segment state. The first
/// resolution of an unknown identity creates an empty cache.
///
/// [`CacheRegistry::global`] is the process-wide registry used by default;
/// independent registries exist so tests can model multiple hosts inside one
/// process.
#[derive(Clone, Debug, Default)]
pub struct CacheRegistry {
    caches: Arc<Mutex<HashMap<Uuid, SharedCache>>>,
}

impl CacheRegistry {
    /// Creates an empty, independent registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the process-wide registry.
    #[must_use]
    pub fn global() -> Self {
        static GLOBAL: OnceLock<CacheRegistry> = OnceLock::new();
        GLOBAL.get_or_init(CacheRegistry::new).clone()
    }

    /// Resolves `uuid` to its shared cache, creating an empty cache on first
    /// reference.
    #[must_use]
    pub fn resolve(&self, uuid: Uuid) -> SharedCache {
        let mut caches = self
            .caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        caches
            .entry(uuid)
            .or_insert_with(|| {
                debug!(%uuid, "registering new segment cache");
                SegmentCache::with_uuid(uuid).into_shared()
            })
            .clone()
    }
}
