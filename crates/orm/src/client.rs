//! Client - configuration, lifecycle and transactions
//!
//! A client is built once from a datasource URL and immutable options,
//! explicitly connected and disconnected, and hands out per-entity
//! repositories. Interactive transactions run a caller-supplied async body
//! with all-or-nothing semantics under the configured max_wait/timeout.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::backends::memory::MemoryBackend;
use crate::backends::postgres::{PoolConfig, PostgresBackend};
use crate::backends::StorageBackend;
use crate::error::{ErrorFormat, OrmError, OrmResult};
use crate::middleware::{Middleware, QueryLogMiddleware};
use crate::repository::{OpsHandle, Repository};
use crate::schema::{Entity, Schema};
use crate::transaction::TransactionOptions;

/// Log severities a client can be configured to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Query,
    Info,
    Warn,
    Error,
}

/// One emitted log event, also handed to the subscribed callback
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub type LogCallback = Arc<dyn Fn(&LogEvent) + Send + Sync>;

/// Routes enabled severities to tracing and to the optional subscriber
pub struct LogSink {
    enabled: HashSet<LogLevel>,
    callback: Option<LogCallback>,
}

impl LogSink {
    pub fn new(levels: Vec<LogLevel>, callback: Option<LogCallback>) -> Self {
        Self {
            enabled: levels.into_iter().collect(),
            callback,
        }
    }

    pub fn emit(&self, level: LogLevel, message: String) {
        if !self.enabled.contains(&level) {
            return;
        }
        match level {
            LogLevel::Query => tracing::debug!(target: "courtside::query", "{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        if let Some(callback) = &self.callback {
            callback(&LogEvent {
                level,
                message,
                timestamp: Utc::now(),
            });
        }
    }
}

const STATE_CREATED: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_DISCONNECTED: u8 = 2;

pub(crate) struct ClientCore {
    pub(crate) schema: Arc<Schema>,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) sink: Arc<LogSink>,
    pub(crate) error_format: ErrorFormat,
    pub(crate) transaction_defaults: TransactionOptions,
    state: AtomicU8,
}

impl ClientCore {
    pub(crate) fn ensure_connected(&self) -> OrmResult<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_CONNECTED => Ok(()),
            STATE_CREATED => Err(OrmError::Initialization(
                "client is not connected; call connect() first".into(),
            )),
            _ => Err(OrmError::Initialization(
                "client has been disconnected".into(),
            )),
        }
    }
}

/// Fluent client construction over an immutable datasource configuration
pub struct ClientBuilder {
    schema: Schema,
    datasource_url: String,
    log: Vec<LogLevel>,
    log_callback: Option<LogCallback>,
    error_format: ErrorFormat,
    transaction_options: TransactionOptions,
    pool_config: PoolConfig,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ClientBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            datasource_url: "memory://".to_string(),
            log: vec![LogLevel::Warn, LogLevel::Error],
            log_callback: None,
            error_format: ErrorFormat::default(),
            transaction_options: TransactionOptions::default(),
            pool_config: PoolConfig::default(),
            middleware: Vec::new(),
        }
    }

    /// Storage target: `memory://` or `postgres://...`
    pub fn datasource_url(mut self, url: impl Into<String>) -> Self {
        self.datasource_url = url.into();
        self
    }

    pub fn log(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.log = levels.into_iter().collect();
        self
    }

    /// Subscribe to emitted log events instead of only the default sink
    pub fn on_log(mut self, callback: impl Fn(&LogEvent) + Send + Sync + 'static) -> Self {
        self.log_callback = Some(Arc::new(callback));
        self
    }

    pub fn error_format(mut self, format: ErrorFormat) -> Self {
        self.error_format = format;
        self
    }

    /// Defaults applied to transactions that do not override them
    pub fn transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = options;
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Append an interceptor to the operation pipeline
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> OrmResult<Client> {
        let url = Url::parse(&self.datasource_url).map_err(|e| {
            OrmError::Initialization(format!(
                "invalid datasource url '{}': {}",
                self.datasource_url, e
            ))
        })?;
        let schema = Arc::new(self.schema);
        let backend: Arc<dyn StorageBackend> = match url.scheme() {
            "memory" => Arc::new(MemoryBackend::new(schema.clone())),
            "postgres" | "postgresql" => Arc::new(PostgresBackend::new(
                schema.clone(),
                self.datasource_url.clone(),
                self.pool_config,
            )),
            other => {
                return Err(OrmError::Initialization(format!(
                    "unsupported datasource scheme '{}'",
                    other
                )));
            }
        };
        let sink = Arc::new(LogSink::new(self.log, self.log_callback));
        let mut middleware: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(QueryLogMiddleware::new(sink.clone()))];
        middleware.extend(self.middleware);
        Ok(Client {
            core: Arc::new(ClientCore {
                schema,
                backend,
                middleware,
                sink,
                error_format: self.error_format,
                transaction_defaults: self.transaction_options,
                state: AtomicU8::new(STATE_CREATED),
            }),
        })
    }
}

/// Handle to the data-access layer; cheap to clone
#[derive(Clone)]
pub struct Client {
    core: Arc<ClientCore>,
}

impl Client {
    pub fn builder(schema: Schema) -> ClientBuilder {
        ClientBuilder::new(schema)
    }

    /// Bring the underlying storage up; operations fail with an
    /// initialization error until this succeeds
    pub async fn connect(&self) -> OrmResult<()> {
        self.core.backend.connect().await?;
        self.core.state.store(STATE_CONNECTED, Ordering::Release);
        self.core.sink.emit(LogLevel::Info, "client connected".into());
        Ok(())
    }

    /// Release the underlying storage; further operations fail with an
    /// initialization error
    pub async fn disconnect(&self) -> OrmResult<()> {
        self.core.backend.disconnect().await?;
        self.core
            .state
            .store(STATE_DISCONNECTED, Ordering::Release);
        self.core.sink.emit(LogLevel::Info, "client disconnected".into());
        Ok(())
    }

    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.core.clone(), OpsHandle::Backend)
    }

    /// Render an error in this client's configured presentation mode
    pub fn render_error(&self, error: &OrmError) -> String {
        error.render(self.core.error_format)
    }

    pub fn error_format(&self) -> ErrorFormat {
        self.core.error_format
    }

    pub fn transaction_defaults(&self) -> &TransactionOptions {
        &self.core.transaction_defaults
    }

    /// Run `body` inside an interactive transaction with the client's
    /// default options
    pub async fn transaction<F, Fut, R>(&self, body: F) -> OrmResult<R>
    where
        F: FnOnce(TransactionClient) -> Fut,
        Fut: Future<Output = OrmResult<R>>,
    {
        self.transaction_with(self.core.transaction_defaults.clone(), body)
            .await
    }

    /// Run `body` inside an interactive transaction. The body's effects
    /// become visible together on success or not at all on failure;
    /// exceeding `max_wait` or `timeout` aborts and rolls back.
    pub async fn transaction_with<F, Fut, R>(
        &self,
        options: TransactionOptions,
        body: F,
    ) -> OrmResult<R>
    where
        F: FnOnce(TransactionClient) -> Fut,
        Fut: Future<Output = OrmResult<R>>,
    {
        self.core.ensure_connected()?;
        let tx = self.core.backend.begin(&options).await?;
        let tx_client = TransactionClient {
            core: self.core.clone(),
            tx: tx.clone(),
        };
        match tokio::time::timeout(options.timeout, body(tx_client)).await {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                tx.rollback().await.ok();
                self.core
                    .sink
                    .emit(LogLevel::Warn, format!("transaction rolled back: {}", e));
                Err(e)
            }
            Err(_) => {
                tx.rollback().await.ok();
                let err = OrmError::Transaction(format!(
                    "transaction body exceeded timeout {:?}",
                    options.timeout
                ));
                self.core
                    .sink
                    .emit(LogLevel::Warn, err.to_string());
                Err(err)
            }
        }
    }
}

/// Repositories bound to one live transaction
#[derive(Clone)]
pub struct TransactionClient {
    core: Arc<ClientCore>,
    tx: Arc<dyn crate::backends::BackendTransaction>,
}

impl TransactionClient {
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.core.clone(), OpsHandle::Transaction(self.tx.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDescriptor, FieldDescriptor, UniqueKeyDescriptor};
    use crate::value::FieldKind;

    static POSTE: EntityDescriptor = EntityDescriptor {
        name: "Poste",
        table: "postes",
        fields: &[
            FieldDescriptor::required("id", FieldKind::String)
                .with_default(crate::schema::FieldDefault::Uuid)
                .immutable(),
            FieldDescriptor::required("nom", FieldKind::String),
        ],
        unique_keys: &[UniqueKeyDescriptor {
            name: "id",
            fields: &["id"],
        }],
        relations: &[],
    };

    #[derive(Debug, Clone)]
    struct Poste {
        id: Option<String>,
        nom: String,
    }

    impl Entity for Poste {
        fn descriptor() -> &'static EntityDescriptor {
            &POSTE
        }

        fn from_record(record: &crate::value::Record) -> OrmResult<Self> {
            Ok(Self {
                id: Some(record.req_string("id")?),
                nom: record.req_string("nom")?,
            })
        }

        fn to_record(&self) -> crate::value::Record {
            crate::value::Record::new()
                .set("id", crate::value::ScalarValue::from(self.id.clone()))
                .set("nom", self.nom.as_str())
        }
    }

    fn schema() -> Schema {
        Schema::new(&[&POSTE])
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let client = Client::builder(schema()).build().unwrap();
        let repo = client.repository::<Poste>();
        let err = repo.count(None).await.unwrap_err();
        assert!(matches!(err, OrmError::Initialization(_)));

        client.connect().await.unwrap();
        assert_eq!(repo.count(None).await.unwrap(), 0);

        client.disconnect().await.unwrap();
        let err = repo.count(None).await.unwrap_err();
        assert!(matches!(err, OrmError::Initialization(_)));
    }

    #[test]
    fn unknown_scheme_is_an_initialization_error() {
        let err = Client::builder(schema())
            .datasource_url("mysql://localhost/db")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, OrmError::Initialization(_)));

        let err = Client::builder(schema())
            .datasource_url("not a url")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, OrmError::Initialization(_)));
    }

    #[tokio::test]
    async fn log_callback_receives_query_events() {
        use std::sync::Mutex;
        let events: Arc<Mutex<Vec<LogEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let client = Client::builder(schema())
            .log([LogLevel::Query])
            .on_log(move |event| sink.lock().unwrap().push(event.clone()))
            .build()
            .unwrap();
        client.connect().await.unwrap();

        let repo = client.repository::<Poste>();
        repo.create(Poste {
            id: None,
            nom: "passeur".into(),
        })
        .await
        .unwrap();

        let events = events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| e.level == LogLevel::Query && e.message.contains("Poste.create")));
        // info events are not enabled
        assert!(events.iter().all(|e| e.level == LogLevel::Query));
    }

    #[tokio::test]
    async fn transaction_commit_and_rollback() {
        let client = Client::builder(schema()).build().unwrap();
        client.connect().await.unwrap();

        client
            .transaction(|tx| async move {
                tx.repository::<Poste>()
                    .create(Poste {
                        id: None,
                        nom: "libero".into(),
                    })
                    .await?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(client.repository::<Poste>().count(None).await.unwrap(), 1);

        let result: OrmResult<()> = client
            .transaction(|tx| async move {
                tx.repository::<Poste>()
                    .create(Poste {
                        id: None,
                        nom: "pointu".into(),
                    })
                    .await?;
                Err(OrmError::validation("forced failure"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(client.repository::<Poste>().count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transaction_timeout_aborts() {
        let client = Client::builder(schema()).build().unwrap();
        client.connect().await.unwrap();

        let options = TransactionOptions::default()
            .timeout(std::time::Duration::from_millis(30));
        let result: OrmResult<()> = client
            .transaction_with(options, |tx| async move {
                tx.repository::<Poste>()
                    .create(Poste {
                        id: None,
                        nom: "central".into(),
                    })
                    .await?;
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(OrmError::Transaction(_))));
        assert_eq!(client.repository::<Poste>().count(None).await.unwrap(), 0);
    }
}
