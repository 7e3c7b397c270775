pub mod memory;

pub use memory::MemoryGraph;

use crate::error::GraphError;
use crate::graph::traversal::Traversal;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Failure reported by the graph server or the socket underneath it. The message
/// is kept verbatim so callers (and the retry classifier) can inspect it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status_message}")]
pub struct TransportError {
    pub status_code: Option<u16>,
    pub status_message: String,
}

impl TransportError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            status_message: message.into(),
        }
    }

    /// Socket-level failure with no server status attached.
    pub fn socket(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            status_message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.status_message
    }
}

/// How a submitted traversal is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Every result, as a list.
    #[default]
    ToList,
    /// The first result only, or null.
    Next,
    /// Side effects only; the result is discarded.
    Iterate,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::ToList => "toList",
            ExecutionMode::Next => "next",
            ExecutionMode::Iterate => "iterate",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toList" => Ok(ExecutionMode::ToList),
            "next" => Ok(ExecutionMode::Next),
            "iterate" => Ok(ExecutionMode::Iterate),
            other => Err(GraphError::InvalidExecutionMode(other.to_string())),
        }
    }
}

/// A live session with a Gremlin server.
///
/// Implementations answer with the server's raw response body (typed GraphSON);
/// normalization happens in the executor.
#[async_trait]
pub trait GraphConnection: Send + Sync {
    async fn submit(&self, traversal: &Traversal, mode: ExecutionMode) -> Result<Value, TransportError>;

    /// Closes the current socket and opens a fresh one.
    async fn reconnect(&self) -> Result<(), TransportError>;
}
