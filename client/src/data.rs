//! Shared mutable state for the peer: the table of in-flight transfers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use crate::types::Transfer;

/// In-flight transfer table plus the monotonic id counter.
pub struct TransferRegistry {
    inner: RwLock<HashMap<String, Arc<Transfer>>>,
    next_id: AtomicU64,
}

impl TransferRegistry {
    pub fn new() -> Self {
        TransferRegistry {
            inner: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Next transfer id: decimal, starting at 1, unique per process.
    pub fn generate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    pub fn register(&self, transfer: Arc<Transfer>) {
        self.inner
            .write()
            .unwrap()
            .insert(transfer.id.clone(), transfer);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Transfer>> {
        self.inner.read().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.inner.write().unwrap().remove(id);
    }

    /// All tracked transfers, ordered by id.
    pub fn list(&self) -> Vec<Arc<Transfer>> {
        let mut transfers: Vec<_> = self.inner.read().unwrap().values().cloned().collect();
        transfers.sort_by_key(|t| t.id.parse::<u64>().unwrap_or(u64::MAX));
        transfers
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub static TRANSFERS: LazyLock<TransferRegistry> = LazyLock::new(TransferRegistry::new);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TransferKind};
    use std::path::PathBuf;

    #[test]
    fn ids_are_monotonic_from_one() {
        let registry = TransferRegistry::new();
        assert_eq!(registry.generate_id(), "1");
        assert_eq!(registry.generate_id(), "2");
        assert_eq!(registry.generate_id(), "3");
    }

    #[test]
    fn register_get_remove() {
        let registry = TransferRegistry::new();
        let id = registry.generate_id();
        let transfer = Arc::new(Transfer::new(
            id.clone(),
            TransferKind::File,
            "x".into(),
            1,
            Direction::Send,
            "7".into(),
            PathBuf::from("/tmp/x"),
            String::new(),
        ));
        registry.register(transfer);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.list().len(), 1);
        registry.remove(&id);
        assert!(registry.get(&id).is_none());
    }
}
