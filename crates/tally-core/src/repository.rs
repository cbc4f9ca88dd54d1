//! In-memory cache of enrolled identities, refreshed from the durable
//! store on demand and on a schedule.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::Identity;

/// Immutable point-in-time view of the enrolled identities.
///
/// Entries are sorted by id, so iteration order — and therefore matcher
/// tie-breaking — is stable across snapshots with the same content.
pub struct Snapshot {
    entries: Vec<Identity>,
    dim: usize,
}

impl Snapshot {
    fn build(dim: usize, mut entries: Vec<Identity>) -> Self {
        entries.retain(|identity| {
            let ok = identity.encoding.dim() == dim;
            if !ok {
                tracing::warn!(
                    id = %identity.id,
                    got = identity.encoding.dim(),
                    expected = dim,
                    "dropping identity with mismatched encoding dimensionality"
                );
            }
            ok
        });
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries.dedup_by(|a, b| a.id == b.id);
        Self { entries, dim }
    }

    /// Expected encoding dimensionality, fixed at repository construction.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.entries
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.entries[idx])
    }
}

/// Identity cache the matcher scans.
///
/// Readers take an `Arc` handle to an immutable snapshot; writers build a
/// replacement and swap it under a brief write lock. A reload never blocks
/// or tears an in-flight match — a match started against the old snapshot
/// completes against the old snapshot.
pub struct EncodingRepository {
    dim: usize,
    current: RwLock<Arc<Snapshot>>,
}

impl EncodingRepository {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            current: RwLock::new(Arc::new(Snapshot::build(dim, Vec::new()))),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Atomically replace the entire mapping. A failed reload upstream must
    /// simply not call this; the previous snapshot stays in place.
    pub fn load(&self, identities: Vec<Identity>) {
        let next = Arc::new(Snapshot::build(self.dim, identities));
        let count = next.len();
        *self.current.write() = next;
        tracing::info!(count, "identity snapshot loaded");
    }

    /// Insert or replace one identity by id.
    pub fn upsert(&self, identity: Identity) {
        if identity.encoding.dim() != self.dim {
            tracing::warn!(
                id = %identity.id,
                got = identity.encoding.dim(),
                expected = self.dim,
                "refusing upsert with mismatched encoding dimensionality"
            );
            return;
        }
        let mut current = self.current.write();
        let mut entries = current.entries.clone();
        match entries.binary_search_by(|e| e.id.cmp(&identity.id)) {
            Ok(idx) => entries[idx] = identity,
            Err(idx) => entries.insert(idx, identity),
        }
        *current = Arc::new(Snapshot {
            entries,
            dim: self.dim,
        });
    }

    /// Remove an identity. Returns whether an entry existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut current = self.current.write();
        match current.entries.binary_search_by(|e| e.id.as_str().cmp(id)) {
            Ok(idx) => {
                let mut entries = current.entries.clone();
                entries.remove(idx);
                *current = Arc::new(Snapshot {
                    entries,
                    dim: self.dim,
                });
                true
            }
            Err(_) => false,
        }
    }

    /// Consistent view for the matcher to scan. Cheap: one Arc clone.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}
