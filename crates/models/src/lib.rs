//! # courtside-models: training-planner domain layer
//!
//! The eight entities of the training planner (exercise library, tags,
//! training sessions with their ordered exercise links, warm-ups and
//! their blocks, match situations, user accounts), their static schema,
//! and the typed client facade over `courtside-orm`.

pub mod client;
pub mod entities;
pub mod schema;

pub use client::{CourtsideClient, CourtsideClientBuilder, CourtsideTransaction};
pub use entities::{
    BlocEchauffement, Echauffement, Entrainement, EntrainementExercice, Exercice, SituationMatch,
    Tag, User,
};
pub use schema::{fields, schema};

// Re-export the engine types callers need to build filters and arguments
pub use courtside_orm::{
    AggKind, AggSelect, AggregateArgs, ErrorFormat, Filter, FindManyArgs, GroupByArgs,
    GroupOrderBy, GroupOrderKey, Having, IsolationLevel, LogEvent, LogLevel, OrderBy, OrmError,
    OrmResult, Patch, Projection, ScalarOp, ScalarValue, SortDirection, TransactionOptions,
    UniqueWhere,
};
