//! Identifier → live connection map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use switchboard_core::ClientId;

use crate::websocket::connection::ClientHandle;

/// Tracks the single current connection for each identifier.
///
/// All operations take one short critical section and never perform I/O
/// while holding it; callers get cloned `Arc`s and act on them after the
/// lock is released.
#[derive(Default)]
pub struct Registry {
    clients: Mutex<HashMap<ClientId, Arc<ClientHandle>>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the current connection for its identifier.
    ///
    /// Returns the connection it replaced, if any. The caller is
    /// responsible for closing it.
    pub fn register(&self, handle: Arc<ClientHandle>) -> Option<Arc<ClientHandle>> {
        let key = handle.client_id().clone();
        self.clients.lock().insert(key, handle)
    }

    /// Remove `handle`, but only if it is still the current connection for
    /// its identifier. A newer connection that replaced it is left alone.
    ///
    /// Returns whether anything was removed.
    pub fn unregister(&self, handle: &Arc<ClientHandle>) -> bool {
        let mut clients = self.clients.lock();
        match clients.get(handle.client_id().as_str()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                let _ = clients.remove(handle.client_id().as_str());
                true
            }
            _ => false,
        }
    }

    /// Current connection for `id`, if any.
    pub fn lookup(&self, id: &str) -> Option<Arc<ClientHandle>> {
        self.clients.lock().get(id).cloned()
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn handle(id: &str) -> Arc<ClientHandle> {
        let (handle, _rx) =
            ClientHandle::channel(ClientId::parse(id).unwrap(), 4, &CancellationToken::new());
        handle
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn register_and_lookup() {
        let registry = Registry::new();
        let alice = handle("alice");
        assert!(registry.register(alice.clone()).is_none());

        let found = registry.lookup("alice").unwrap();
        assert!(Arc::ptr_eq(&found, &alice));
        assert!(registry.lookup("bob").is_none());
    }

    #[test]
    fn register_returns_replaced_handle() {
        let registry = Registry::new();
        let first = handle("alice");
        let second = handle("alice");
        let _ = registry.register(first.clone());

        let previous = registry.register(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert!(Arc::ptr_eq(&registry.lookup("alice").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_current_removes() {
        let registry = Registry::new();
        let alice = handle("alice");
        let _ = registry.register(alice.clone());

        assert!(registry.unregister(&alice));
        assert!(registry.lookup("alice").is_none());
    }

    #[test]
    fn unregister_stale_handle_keeps_newer() {
        let registry = Registry::new();
        let old = handle("alice");
        let new = handle("alice");
        let _ = registry.register(old.clone());
        let _ = registry.register(new.clone());

        assert!(!registry.unregister(&old));
        assert!(Arc::ptr_eq(&registry.lookup("alice").unwrap(), &new));
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let registry = Registry::new();
        let _ = registry.register(handle("bob"));
        assert!(!registry.unregister(&handle("alice")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_twice() {
        let registry = Registry::new();
        let alice = handle("alice");
        let _ = registry.register(alice.clone());
        assert!(registry.unregister(&alice));
        assert!(!registry.unregister(&alice));
    }

    #[test]
    fn concurrent_register_keeps_one_per_identifier() {
        let registry = Arc::new(Registry::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let id = format!("peer{}", (i + j) % 4);
                        let h = handle(&id);
                        let _ = registry.register(h.clone());
                        let _ = registry.unregister(&h);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.len() <= 4);
    }
}
