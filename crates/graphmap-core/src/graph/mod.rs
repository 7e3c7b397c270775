// Graph query layer
//
// Traversal bytecode, its GraphSON codec, the where-clause compiler and the
// builder/executor pair every connector operation runs through.

pub mod cache;
pub mod executor;
pub mod filter;
pub mod graphson;
pub mod query_builder;
pub mod traversal;

pub use cache::{PropertyTypes, TypeCache};
pub use executor::{Executor, FailureClass, RawOptions};
pub use filter::{build_where, Condition, Operator};
pub use graphson::{convert_edge, decode_bytecode, encode_bytecode, normalize};
pub use query_builder::{EdgeReference, QueryBuilder};
pub use traversal::{Argument, Predicate, PropertyKey, Step, Token, Traversal};
