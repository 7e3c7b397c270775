// Traversal executor
// Submits traversals (or parks them in an open transaction), normalizes responses and
// resubmits on transient server failures.

use super::graphson::normalize;
use super::traversal::Traversal;
use crate::connection::{ExecutionMode, GraphConnection, TransportError};
use crate::error::Result;
use crate::model::ModelRegistry;
use crate::transaction::TransactionRegistry;
use graphmap_common::{Options, RetryPolicy};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const CONCURRENT_MODIFICATION: &str = "ConcurrentModificationException";
const READ_ONLY_VIOLATION: &str = "ReadOnlyViolationException";
const SOCKET_CLOSED: &str = "WebSocket is not open";

/// How a failed submission should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Optimistic-concurrency collision or replica routing hiccup.
    Transient,
    /// The socket dropped; reopen it, then retry.
    Disconnected,
    Fatal,
}

impl FailureClass {
    pub fn of(error: &TransportError) -> Self {
        let message = error.message();
        if message.contains(CONCURRENT_MODIFICATION) || message.contains(READ_ONLY_VIOLATION) {
            FailureClass::Transient
        } else if message.contains(SOCKET_CLOSED) {
            FailureClass::Disconnected
        } else {
            FailureClass::Fatal
        }
    }
}

/// Options accepted by raw execution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOptions {
    /// `toList` (default), `next` or `iterate`.
    #[serde(default)]
    pub method: Option<String>,
    /// `false` returns the server response untouched.
    #[serde(default)]
    pub parse: Option<bool>,
    #[serde(default)]
    pub transaction: Option<String>,
}

#[derive(Clone)]
pub struct Executor {
    connection: Arc<dyn GraphConnection>,
    models: Arc<ModelRegistry>,
    transactions: Arc<TransactionRegistry>,
}

impl Executor {
    pub fn new(
        connection: Arc<dyn GraphConnection>,
        models: Arc<ModelRegistry>,
        transactions: Arc<TransactionRegistry>,
    ) -> Self {
        Self {
            connection,
            models,
            transactions,
        }
    }

    /// Runs `traversal` for `model`. Under an open transaction the traversal becomes the
    /// transaction's pending traversal and nothing is submitted; the result is then `Null`.
    pub async fn execute(
        &self,
        model: Option<&str>,
        traversal: Traversal,
        mode: ExecutionMode,
        options: &Options,
    ) -> Result<Value> {
        if let Some(tx) = &options.transaction {
            self.transactions.store(tx, traversal)?;
            return Ok(Value::Null);
        }
        self.submit(model, &traversal, mode, true).await
    }

    /// Submits with retry. Without a model there is no retry policy, so failures
    /// surface after the first attempt.
    pub async fn submit(
        &self,
        model: Option<&str>,
        traversal: &Traversal,
        mode: ExecutionMode,
        parse: bool,
    ) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            tracing::debug!(
                "Submitting {} ({}) for model {:?}, attempt {}",
                traversal,
                mode,
                model,
                attempt
            );

            let error = match self.connection.submit(traversal, mode).await {
                Ok(raw) => {
                    return Ok(match mode {
                        ExecutionMode::Iterate => Value::Null,
                        _ if parse => normalize(raw),
                        _ => raw,
                    })
                }
                Err(e) => e,
            };

            let Some(policy) = self.retry_policy(model, &error).await else {
                return Err(error.into());
            };
            if attempt >= policy.max_retries {
                tracing::warn!(
                    "Giving up on {} after {} retries: {}",
                    traversal,
                    attempt,
                    error
                );
                return Err(error.into());
            }

            attempt += 1;
            tracing::warn!(
                "Retrying {} in {:?} (retry {}/{}): {}",
                traversal,
                policy.delay(),
                attempt,
                policy.max_retries,
                error
            );
            tokio::time::sleep(policy.delay()).await;
        }
    }

    /// Policy to retry under, or `None` when `error` must surface now. Looked up on
    /// every failure so a policy change applies to in-flight calls.
    async fn retry_policy(&self, model: Option<&str>, error: &TransportError) -> Option<RetryPolicy> {
        let model = model?;
        match FailureClass::of(error) {
            FailureClass::Fatal => None,
            FailureClass::Transient => self.models.retry_policy(model),
            FailureClass::Disconnected => {
                tracing::warn!("Connection lost ({}), reconnecting", error);
                if let Err(e) = self.connection.reconnect().await {
                    tracing::warn!("Reconnect failed: {}", e);
                }
                self.models.retry_policy(model)
            }
        }
    }

    /// Escape hatch for hand-built traversals. No model context, so no retry.
    pub async fn raw(&self, traversal: Traversal, options: &RawOptions) -> Result<Value> {
        let mode = match &options.method {
            Some(m) => m.parse::<ExecutionMode>()?,
            None => ExecutionMode::ToList,
        };
        if let Some(tx) = &options.transaction {
            self.transactions.store(tx, traversal)?;
            return Ok(Value::Null);
        }
        self.submit(None, &traversal, mode, options.parse.unwrap_or(true)).await
    }
}
