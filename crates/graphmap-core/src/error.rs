use crate::connection::TransportError;
use graphmap_common::UnknownPropertyType;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("ID is required")]
    MissingId,

    #[error("Edge entity requires FROM and TO fields (missing {0})")]
    MissingReference(&'static str),

    #[error("Relational field {field} must be MODEL/ID format, got {value:?}")]
    InvalidReferenceFormat { field: &'static str, value: String },

    #[error("{0}")]
    Validation(String),

    #[error("Model {0} is not registered")]
    UnknownModel(String),

    #[error("{0} operator is not implemented on Gremlin")]
    UnsupportedOperator(String),

    #[error("Type {0} is not supported.")]
    UnsupportedType(String),

    #[error("Invalid method {0:?}, should be toList, next or iterate")]
    InvalidExecutionMode(String),

    #[error("Transaction {0} expired or does not exist")]
    TransactionNotFound(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GraphError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GraphError::Validation(msg.into())
    }

    /// Errors raised while building a traversal, before anything reaches the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GraphError::MissingId
                | GraphError::MissingReference(_)
                | GraphError::InvalidReferenceFormat { .. }
                | GraphError::Validation(_)
                | GraphError::UnknownModel(_)
                | GraphError::UnsupportedOperator(_)
                | GraphError::UnsupportedType(_)
                | GraphError::InvalidExecutionMode(_)
        )
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            GraphError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<UnknownPropertyType> for GraphError {
    fn from(e: UnknownPropertyType) -> Self {
        GraphError::UnsupportedType(e.0)
    }
}
