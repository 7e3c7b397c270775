//! Pseudo-transactions.
//!
//! The graph store has no client-visible transactions, so mutations issued under a
//! transaction id are accumulated into one pending traversal and submitted in a
//! single request on commit. Every open transaction carries an expiry timer; when it
//! fires first the record is dropped as if rolled back.

use crate::error::{GraphError, Result};
use crate::graph::traversal::Traversal;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct TransactionRecord {
    pending: Option<Traversal>,
    expiry: JoinHandle<()>,
}

pub struct TransactionRegistry {
    open: Arc<DashMap<String, TransactionRecord>>,
    clear_timeout: Duration,
}

impl TransactionRegistry {
    pub fn new(clear_timeout: Duration) -> Self {
        Self {
            open: Arc::new(DashMap::new()),
            clear_timeout,
        }
    }

    /// Opens a transaction. Must be called from within a tokio runtime.
    pub fn begin(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let expiry = spawn_expiry(Arc::downgrade(&self.open), id.clone(), self.clear_timeout);
        self.open.insert(
            id.clone(),
            TransactionRecord {
                pending: None,
                expiry,
            },
        );
        tracing::info!("Transaction {} opened, expires in {:?}", id, self.clear_timeout);
        id
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.open.contains_key(id)
    }

    /// Traversal accumulated so far under `id`.
    pub fn pending(&self, id: &str) -> Result<Option<Traversal>> {
        self.open
            .get(id)
            .map(|r| r.pending.clone())
            .ok_or_else(|| GraphError::TransactionNotFound(id.to_string()))
    }

    /// Replaces the pending traversal of `id`.
    pub fn store(&self, id: &str, traversal: Traversal) -> Result<()> {
        let mut record = self
            .open
            .get_mut(id)
            .ok_or_else(|| GraphError::TransactionNotFound(id.to_string()))?;
        tracing::debug!("Transaction {} pending: {}", id, traversal);
        record.pending = Some(traversal);
        Ok(())
    }

    /// Closes `id` for commit, handing back whatever was accumulated.
    pub fn take(&self, id: &str) -> Result<Option<Traversal>> {
        let (_, record) = self
            .open
            .remove(id)
            .ok_or_else(|| GraphError::TransactionNotFound(id.to_string()))?;
        record.expiry.abort();
        Ok(record.pending)
    }

    /// Discards `id`. Returns false when there was nothing to discard.
    pub fn rollback(&self, id: &str) -> bool {
        match self.open.remove(id) {
            Some((_, record)) => {
                record.expiry.abort();
                tracing::info!("Transaction {} rolled back", id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

impl Drop for TransactionRegistry {
    fn drop(&mut self) {
        for entry in self.open.iter() {
            entry.value().expiry.abort();
        }
    }
}

fn spawn_expiry(
    open: Weak<DashMap<String, TransactionRecord>>,
    id: String,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(open) = open.upgrade() else {
            return;
        };
        if open.remove(&id).is_some() {
            tracing::info!("Transaction {} expired after {:?}", id, timeout);
        }
    })
}
