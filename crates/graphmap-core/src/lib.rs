pub mod connection;
pub mod connector;
pub mod error;
pub mod graph;
pub mod model;
pub mod property;
pub mod transaction;

pub use connection::{ExecutionMode, GraphConnection, MemoryGraph, TransportError};
pub use connector::GraphConnector;
pub use error::{GraphError, Result};
pub use graph::{Executor, RawOptions, Traversal};
pub use model::{ModelDefinition, ModelRegistry, PropertyDefinition};
pub use transaction::TransactionRegistry;

// Re-export common types for convenience
pub use graphmap_common::{AffectedCount, Filter, ModelKind, Options, PropertyType, Record, RetryPolicy};
