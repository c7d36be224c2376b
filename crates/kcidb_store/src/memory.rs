//! In-process store used for dry runs and tests.

use crate::error::{Result, StoreError};
use crate::objects::{object_rows, LoadReport};
use crate::StoreClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MemoryState {
    documents: Vec<Value>,
    reject_reason: Option<String>,
}

/// Keeps every loaded document in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents loaded so far, oldest first.
    pub fn documents(&self) -> Vec<Value> {
        self.lock().documents.clone()
    }

    /// Make every following load fail with a constraint error.
    pub fn reject_loads(&self, reason: impl Into<String>) {
        self.lock().reject_reason = Some(reason.into());
    }

    pub fn accept_loads(&self) {
        self.lock().reject_reason = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    fn describe(&self) -> String {
        "memory:".to_string()
    }

    async fn load(&self, doc: &Value) -> Result<LoadReport> {
        let report = LoadReport::from_rows(&object_rows(doc)?);
        let mut state = self.lock();
        if let Some(reason) = &state.reject_reason {
            return Err(StoreError::constraint(reason.clone()));
        }
        state.documents.push(doc.clone());
        Ok(report)
    }
}
