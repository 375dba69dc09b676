use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::app::ports::SourceStorePort;
use crate::domain::SourceSnapshot;
use crate::error::{AuditError, Result};

/// In-memory source store for development/testing
#[derive(Clone, Default)]
pub struct InMemorySourceStore {
    snapshot: Arc<Mutex<SourceSnapshot>>,
}

impl InMemorySourceStore {
    pub fn new(snapshot: SourceSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Swap in new source data; runs already holding a snapshot are unaffected
    pub fn replace(&self, snapshot: SourceSnapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| AuditError::SourceUnavailable("in-memory store lock poisoned".to_string()))?;
        *guard = snapshot;
        Ok(())
    }
}

#[async_trait]
impl SourceStorePort for InMemorySourceStore {
    async fn load_snapshot(&self) -> Result<SourceSnapshot> {
        let guard = self
            .snapshot
            .lock()
            .map_err(|_| AuditError::SourceUnavailable("in-memory store lock poisoned".to_string()))?;
        debug!(audits = guard.audits.len(), "Cloned in-memory snapshot");
        Ok(guard.clone())
    }
}
