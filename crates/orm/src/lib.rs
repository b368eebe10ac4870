//! # courtside-orm: generic data-access engine
//!
//! Schema-descriptor-driven data layer: one filter engine, one CRUD
//! dispatcher and one transaction surface shared by every entity a client
//! serves. Storage is pluggable behind the backend traits, with an
//! embedded in-memory engine and a PostgreSQL engine over sqlx.
//!
//! Entities live in their own crate (`courtside-models` for the training
//! planner); this crate only knows descriptors, records and filters.

pub mod backends;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod middleware;
pub mod projection;
pub mod query;
pub mod repository;
pub mod schema;
pub mod transaction;
pub mod value;

// Re-export the caller-facing surface
pub use client::{Client, ClientBuilder, LogCallback, LogEvent, LogLevel, LogSink, TransactionClient};
pub use dispatch::{Action, Dispatcher, Operation, OperationArgs, QueryResult};
pub use error::{ErrorFormat, OrmError, OrmResult};
pub use filter::{Filter, ScalarOp, StringMode};
pub use middleware::{Middleware, Next, QueryLogMiddleware};
pub use projection::{ProjectedRow, Projection};
pub use query::aggregate::{
    AggKind, AggSelect, AggregateArgs, AggregateResult, GroupByArgs, GroupOrderBy, GroupOrderKey,
    GroupRow, Having,
};
pub use query::{FindManyArgs, NullsOrder, OrderBy, Patch, SortDirection, UniqueWhere};
pub use repository::Repository;
pub use schema::{
    Entity, EntityDescriptor, FieldDefault, FieldDescriptor, RelationDescriptor, RelationKind,
    Schema, UniqueKeyDescriptor,
};
pub use transaction::{IsolationLevel, TransactionOptions};
pub use value::{FieldKind, Record, ScalarValue};
