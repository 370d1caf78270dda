//! Transactions with a per-transaction isolation level.
//!
//! The connection's isolation level is read when the transaction begins and
//! put back when it ends, whichever way it ends.

use std::sync::Arc;

use super::connection::{Connection, NativeConn, Shared};
use super::coordinator::await_call;
use crate::context::Context;
use crate::driver::{IsolationLevel, TxOptions};
use crate::error::{Error, Result};

const ISOLATION_OPTION: &str = "isolation_level";

fn set_isolation_sql(level: &str) -> String {
    format!("SET TEMPORARY OPTION {} = {}", ISOLATION_OPTION, level)
}

/// The server's value for `isolation_level`, if supported.
fn isolation_value(level: IsolationLevel) -> Option<&'static str> {
    match level {
        IsolationLevel::Default | IsolationLevel::ReadUncommitted => Some("0"),
        IsolationLevel::ReadCommitted => Some("1"),
        IsolationLevel::RepeatableRead => Some("2"),
        IsolationLevel::Snapshot => Some("snapshot"),
        IsolationLevel::Serializable => Some("3"),
        IsolationLevel::WriteCommitted | IsolationLevel::Linearizable => None,
    }
}

/// Start a transaction on `native` and switch it to `level`. Returns the level
/// that was in effect before.
fn start(native: &mut NativeConn, level: &str) -> Result<String> {
    native.execute_immediate("BEGIN TRANSACTION")?;

    let switched = native
        .option(ISOLATION_OPTION)
        .and_then(|previous| native.execute_immediate(&set_isolation_sql(level)).map(|()| previous));

    if switched.is_err() {
        if let Err(err) = native.rollback() {
            tracing::warn!(error = %err, "rollback after failed begin");
        }
    }
    switched
}

impl Connection {
    /// Begin a transaction with default options.
    pub async fn begin(&self, ctx: &Context) -> Result<Transaction<'_>> {
        self.begin_tx(ctx, TxOptions::default()).await
    }

    /// Begin a transaction. Read-only transactions and the isolation levels
    /// the server has no equivalent for are rejected before anything is sent.
    pub async fn begin_tx(&self, ctx: &Context, opts: TxOptions) -> Result<Transaction<'_>> {
        if opts.read_only {
            return Err(Error::UnsupportedOption(
                "read-only transactions are not supported".to_string(),
            ));
        }
        let level = isolation_value(opts.isolation).ok_or_else(|| {
            Error::UnsupportedOption(format!("isolation level {:?} is not supported", opts.isolation))
        })?;
        self.shared().ensure_valid()?;

        let shared = Arc::clone(self.shared());
        let previous = await_call(ctx, &self.shared().canceller, move || {
            start(&mut shared.native.lock(), level)
        })
        .await?;

        tracing::debug!(isolation = level, previous = %previous, "began transaction");
        Ok(Transaction {
            conn: self,
            previous,
            done: false,
        })
    }
}

/// An open transaction. Dropping it without committing rolls it back.
pub struct Transaction<'c> {
    conn: &'c Connection,
    previous: String,
    done: bool,
}

impl Transaction<'_> {
    /// The isolation level that will be restored when the transaction ends.
    pub fn previous_isolation(&self) -> &str {
        &self.previous
    }

    pub fn commit(mut self) -> Result<()> {
        self.finish(NativeConn::commit, "commit")
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finish(NativeConn::rollback, "rollback")
    }

    fn finish(&mut self, end: fn(&mut NativeConn) -> Result<()>, action: &'static str) -> Result<()> {
        self.done = true;
        let shared: &Shared = self.conn.shared();
        shared.ensure_valid()?;

        let mut native = shared.native.lock();
        let result = end(&mut native);
        if let Err(err) = native.execute_immediate(&set_isolation_sql(&self.previous)) {
            tracing::warn!(error = %err, level = %self.previous, "could not restore isolation level");
        }

        tracing::debug!(action, ok = result.is_ok(), "finished transaction");
        result
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.done || !self.conn.is_valid() {
            return;
        }
        if let Err(err) = self.finish(NativeConn::rollback, "rollback") {
            tracing::warn!(error = %err, "rollback of dropped transaction");
        }
    }
}
