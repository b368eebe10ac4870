//! Transaction configuration
//!
//! Interactive transactions run a caller-supplied async body with
//! all-or-nothing semantics. `max_wait` bounds acquisition of the
//! transaction, `timeout` bounds the body; exceeding either aborts the
//! transaction and rolls back.

use std::time::Duration;

/// Standard isolation levels. The memory backend serializes transactions
/// behind a global gate and therefore satisfies every level; PostgreSQL
/// receives the level verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL fragment for SET TRANSACTION ISOLATION LEVEL
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Per-transaction knobs; client-level defaults apply when not overridden
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Time allowed to acquire the transaction
    pub max_wait: Duration,
    /// Time allowed for the transaction body to run
    pub timeout: Duration,
    /// None = storage-engine default
    pub isolation_level: Option<IsolationLevel>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(2000),
            timeout: Duration::from_millis(5000),
            isolation_level: None,
        }
    }
}

impl TransactionOptions {
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_sql() {
        assert_eq!(IsolationLevel::ReadUncommitted.as_sql(), "READ UNCOMMITTED");
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }

    #[test]
    fn contract_defaults() {
        let options = TransactionOptions::default();
        assert_eq!(options.max_wait, Duration::from_millis(2000));
        assert_eq!(options.timeout, Duration::from_millis(5000));
        assert!(options.isolation_level.is_none());
    }
}
