//! Middleware chain around operation dispatch
//!
//! An ordered list of interceptors wraps every operation: each sees the
//! operation and a continuation, and may observe, rewrite arguments,
//! short-circuit, or re-run the remainder of the chain. The built-in query
//! logger rides this mechanism.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::client::{LogLevel, LogSink};
use crate::dispatch::{Dispatcher, Operation, QueryResult};
use crate::error::OrmResult;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, op: Operation, next: Next<'_>) -> OrmResult<QueryResult>;
}

/// Continuation of the chain; `Copy` so a middleware can re-run the
/// remainder (retry patterns)
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    dispatcher: &'a Dispatcher<'a>,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], dispatcher: &'a Dispatcher<'a>) -> Self {
        Self { chain, dispatcher }
    }

    pub async fn run(self, op: Operation) -> OrmResult<QueryResult> {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                middleware
                    .handle(
                        op,
                        Next {
                            chain: rest,
                            dispatcher: self.dispatcher,
                        },
                    )
                    .await
            }
            None => self.dispatcher.execute(op).await,
        }
    }
}

/// Emits one query-level log event per operation, with duration, and an
/// error-level event when the operation fails
pub struct QueryLogMiddleware {
    sink: Arc<LogSink>,
}

impl QueryLogMiddleware {
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for QueryLogMiddleware {
    async fn handle(&self, op: Operation, next: Next<'_>) -> OrmResult<QueryResult> {
        let entity = op.entity.name;
        let action = op.action;
        let started = Instant::now();
        let result = next.run(op).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => self.sink.emit(
                LogLevel::Query,
                format!("{}.{} in {:?}", entity, action, elapsed),
            ),
            Err(e) => self.sink.emit(
                LogLevel::Error,
                format!("{}.{} failed after {:?}: {}", entity, action, elapsed, e),
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use crate::backends::{BackendOps, StorageBackend};
    use crate::dispatch::OperationArgs;
    use crate::query::FindManyArgs;
    use crate::schema::{EntityDescriptor, FieldDescriptor, Schema, UniqueKeyDescriptor};
    use crate::value::{FieldKind, Record};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static SALLE: EntityDescriptor = EntityDescriptor {
        name: "Salle",
        table: "salles",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String),
            FieldDescriptor::required("nom", FieldKind::String),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    struct CountingMiddleware {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Middleware for CountingMiddleware {
        async fn handle(&self, op: Operation, next: Next<'_>) -> OrmResult<QueryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            next.run(op).await
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(&self, _op: Operation, _next: Next<'_>) -> OrmResult<QueryResult> {
            Ok(QueryResult::Records(Vec::new()))
        }
    }

    #[tokio::test]
    async fn chain_runs_in_order_and_reaches_dispatch() {
        let schema = Schema::new(&[&SALLE]);
        let backend = MemoryBackend::new(Arc::new(schema.clone()));
        backend
            .insert(&SALLE, Record::new().set("id", "s1").set("nom", "Gymnase A"))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(CountingMiddleware {
                calls: calls.clone(),
            }),
            Arc::new(CountingMiddleware {
                calls: calls.clone(),
            }),
        ];
        let dispatcher = Dispatcher {
            schema: &schema,
            ops: backend.as_ops(),
        };
        let op = Operation::new(
            &SALLE,
            OperationArgs::Find {
                args: FindManyArgs::new(),
            },
        );
        let result = Next::new(&chain, &dispatcher).run(op).await.unwrap();
        assert!(matches!(result, QueryResult::Records(rows) if rows.len() == 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let schema = Schema::new(&[&SALLE]);
        let backend = MemoryBackend::new(Arc::new(schema.clone()));
        backend
            .insert(&SALLE, Record::new().set("id", "s1").set("nom", "Gymnase A"))
            .await
            .unwrap();

        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(ShortCircuit)];
        let dispatcher = Dispatcher {
            schema: &schema,
            ops: backend.as_ops(),
        };
        let op = Operation::new(
            &SALLE,
            OperationArgs::Find {
                args: FindManyArgs::new(),
            },
        );
        let result = Next::new(&chain, &dispatcher).run(op).await.unwrap();
        // the stored row never reached the result
        assert!(matches!(result, QueryResult::Records(rows) if rows.is_empty()));
    }
}
