use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioHandle(Uuid);

impl fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audio:{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    live: Arc<Mutex<HashMap<AudioHandle, Arc<[u8]>>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<AudioHandle, Arc<[u8]>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, bytes: Arc<[u8]>) -> AudioHandle {
        let handle = AudioHandle(Uuid::new_v4());
        self.table().insert(handle.clone(), bytes);
        handle
    }

    pub fn resolve(&self, handle: &AudioHandle) -> Option<Arc<[u8]>> {
        self.table().get(handle).cloned()
    }

    pub fn release(&self, handle: &AudioHandle) -> bool {
        self.table().remove(handle).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_distinct_for_identical_bytes() {
        let registry = HandleRegistry::new();
        let bytes: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);
        let a = registry.create(bytes.clone());
        let b = registry.create(bytes);
        assert_ne!(a, b);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn released_handle_no_longer_resolves() {
        let registry = HandleRegistry::new();
        let handle = registry.create(Arc::from(vec![9u8; 4]));
        assert_eq!(registry.resolve(&handle).as_deref(), Some(&[9u8; 4][..]));

        assert!(registry.release(&handle));
        assert!(registry.resolve(&handle).is_none());
        assert!(!registry.release(&handle));
        assert_eq!(registry.live_count(), 0);
    }
}
