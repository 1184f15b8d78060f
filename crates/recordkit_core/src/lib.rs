#![allow(clippy::result_large_err)]

#[cfg(feature = "async")]
mod async_backend;
mod backend;
mod capabilities;
mod config;
mod dialect;
mod eager_load;
mod error;
pub mod expr;
mod query;
mod query_builder;
mod query_safety;
mod transaction;
mod type_adapter;
mod value;
mod wire;

#[cfg(feature = "async")]
pub use async_backend::AsyncStorageBackend;
pub use backend::{
    DmlData, ExecuteRequest, ExplainResult, Model, ReturningRequest, StorageBackend, TransactionHandle,
};
pub use capabilities::{
    AdvancedGrouping, CapabilityCategory, Capabilities, CteFeatures, JsonOperations, ReturningCapability,
    SetOperations, WindowFunctions,
};
pub use config::{ConnectionConfig, PoolConfig, SslMode, TlsConfig};
pub use dialect::{AnsiDialect, PlaceholderStyle, Protocol, SqlDialect};
pub use eager_load::EagerLoadScope;
pub use error::{DbError, ErrorDetail, ErrorLocation};
pub use query::{renumber_placeholders, ColumnMeta, QueryRequest, QueryResult, Row};
pub use query_builder::{ExplainBuilder, QueryBuilder, SetOperationBuilder, WithQueryBuilder};
pub use query_safety::{is_safe_read_query, validate_identifier};
pub use transaction::{BeginStatement, IsolationLevel, TransactionManager, TransactionSnapshot, TransactionState};
pub use type_adapter::{AdapterOptions, TypeAdapter, TypeAdapterKey, TypeAdapterRegistry};
pub use value::Value;
pub use wire::{InMemoryType, WireType};

pub use chrono;
pub use uuid;
