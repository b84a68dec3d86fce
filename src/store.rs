use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only list of submitted items, shared by every request of one app.
#[derive(Clone, Debug, Default)]
pub struct ItemStore {
    items: Arc<Mutex<Vec<Value>>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Value) -> usize {
        let mut items = self.lock();
        items.push(item);
        items.len()
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
