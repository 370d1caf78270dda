//! SQL Anywhere connection.
//!
//! A connection owns one native handle behind a lock. Every blocking call
//! takes that lock for its whole duration, so statements, rows and results
//! created from the connection can never overlap calls on the handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::coordinator::await_call;
use super::named::split_named;
use super::native::{NativeCancel, NativeConnection, NativeStatement, ERROR_SIZE, SQLCODE_NO_DATA};
use super::registry::Registry;
use super::result::ExecResult;
use super::rows::Rows;
use super::statement::{Statement, StatementState};
use super::types;
use crate::context::Context;
use crate::driver::NamedValue;
use crate::error::{Error, NativeError, Result};

// ============================================================================
// Native handle
// ============================================================================

/// The native connection handle and its reusable error buffer.
pub(crate) struct NativeConn {
    raw: Option<Box<dyn NativeConnection>>,
    errbuf: [u8; ERROR_SIZE],
}

impl NativeConn {
    pub(crate) fn new(raw: Box<dyn NativeConnection>) -> Self {
        Self {
            raw: Some(raw),
            errbuf: [0; ERROR_SIZE],
        }
    }

    /// The live handle, or `BadConnection` once it has been freed.
    pub(crate) fn raw(&mut self) -> Result<&mut Box<dyn NativeConnection>> {
        self.raw.as_mut().ok_or(Error::BadConnection)
    }

    /// Read and clear the last native error.
    ///
    /// `None` when the library has nothing recorded; `EndOfData` for the
    /// "row not found" code.
    pub(crate) fn last_error(&mut self, prefix: &str) -> Option<Error> {
        let NativeConn { raw, errbuf } = self;
        let raw = raw.as_mut()?;

        errbuf.fill(0);
        let code = raw.error(&mut errbuf[..]);
        raw.clear_error();

        if code == 0 {
            return None;
        }
        if code == SQLCODE_NO_DATA {
            return Some(Error::EndOfData);
        }

        let len = errbuf.iter().position(|b| *b == 0).unwrap_or(errbuf.len());
        Some(Error::Native(NativeError {
            prefix: prefix.to_string(),
            message: String::from_utf8_lossy(&errbuf[..len]).into_owned(),
            code,
        }))
    }

    /// The last native error, or a generic one when nothing was recorded.
    pub(crate) fn failure(&mut self, prefix: &str) -> Error {
        if self.raw.is_none() {
            return Error::BadConnection;
        }
        self.last_error(prefix).unwrap_or_else(|| {
            Error::Native(NativeError {
                prefix: prefix.to_string(),
                message: "no error information".to_string(),
                code: 0,
            })
        })
    }

    pub(crate) fn execute_immediate(&mut self, sql: &str) -> Result<()> {
        if self.raw()?.execute_immediate(sql) {
            return Ok(());
        }
        Err(self.failure("did not execute"))
    }

    pub(crate) fn execute_direct(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>> {
        match self.raw()?.execute_direct(sql) {
            Some(stmt) => Ok(stmt),
            None => Err(self.failure("did not execute direct")),
        }
    }

    pub(crate) fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement>> {
        match self.raw()?.prepare(sql) {
            Some(stmt) => Ok(stmt),
            None => Err(self.failure("did not prepare statement")),
        }
    }

    /// Read a connection property as text.
    ///
    /// Only reliable while the connection is used exclusively, as within a
    /// transaction.
    pub(crate) fn option(&mut self, property: &str) -> Result<String> {
        let sql = format!("SELECT CONNECTION_PROPERTY('{}')", property);
        let mut stmt = self.execute_direct(&sql)?;

        if stmt.num_cols() != 1 {
            let detail = self.last_error("").map(|e| e.to_string()).unwrap_or_default();
            return Err(Error::Driver(format!(
                "did not read connection option, ncols != 1: {}",
                detail
            )));
        }
        if !stmt.fetch_next() {
            return Err(self.failure(&sql));
        }

        let value = match stmt.get_column(0) {
            Some(data) if !data.is_null => String::from_utf8_lossy(data.buffer).into_owned(),
            Some(_) => String::new(),
            None => return Err(self.failure(&sql)),
        };
        if value.is_empty() {
            return Err(Error::Driver(format!(
                "no result for connection property '{}': check the property name",
                property
            )));
        }
        Ok(value)
    }

    pub(crate) fn commit(&mut self) -> Result<()> {
        if self.raw()?.commit() {
            return Ok(());
        }
        Err(self.failure("did not commit"))
    }

    pub(crate) fn rollback(&mut self) -> Result<()> {
        if self.raw()?.rollback() {
            return Ok(());
        }
        Err(self.failure("did not rollback"))
    }

    /// Run a query returning a single integer.
    pub(crate) fn query_int(&mut self, sql: &str) -> Result<i64> {
        let mut stmt = self.execute_direct(sql)?;
        if !stmt.fetch_absolute(1) {
            return Err(self.failure("did not fetch"));
        }

        let native_type = match stmt.column_info(0) {
            Some(info) => info.native_type,
            None => return Err(self.failure("did not get column info")),
        };
        let value = match stmt.get_column(0) {
            Some(data) => types::decode(native_type, &data)?,
            None => return Err(self.failure("did not get value")),
        };

        value
            .as_i64()
            .ok_or_else(|| Error::InvalidValue(format!("{} returned {}", sql, value.kind())))
    }
}

/// State shared by a connection and everything created from it.
///
/// Locks are taken in the order `native`, `statements`, then a statement's
/// own state.
pub(crate) struct Shared {
    pub(crate) native: Mutex<NativeConn>,
    pub(crate) canceller: Arc<dyn NativeCancel>,
    statements: Mutex<Vec<Weak<Mutex<StatementState>>>>,
    valid: AtomicBool,
}

impl Shared {
    /// Remember a statement so that closing the connection frees it before
    /// the connection handle.
    pub(crate) fn track(&self, state: &Arc<Mutex<StatementState>>) {
        let mut statements = self.statements.lock();
        statements.retain(|s| s.strong_count() > 0);
        statements.push(Arc::downgrade(state));
    }

    /// Free every statement still open. The caller holds the native lock.
    fn free_statements(&self) -> usize {
        let statements = std::mem::take(&mut *self.statements.lock());
        let mut freed = 0;
        for state in statements.iter().filter_map(Weak::upgrade) {
            let mut state = state.lock();
            state.arena.release();
            if state.raw.take().is_some() {
                freed += 1;
            }
        }
        freed
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::BadConnection)
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A connection to a SQL Anywhere database.
///
/// Issue one operation at a time; a second call before the first returns
/// waits for the native handle.
pub struct Connection {
    shared: Arc<Shared>,
    registry: Arc<Registry>,
    closed: bool,
}

impl Connection {
    /// Allocate a handle from `registry` and connect it with `dsn`.
    pub(crate) async fn connect(ctx: &Context, registry: Arc<Registry>, dsn: &str) -> Result<Self> {
        let raw = registry.acquire()?;
        let canceller = raw.canceller();

        let mut conn = Connection {
            shared: Arc::new(Shared {
                native: Mutex::new(NativeConn::new(raw)),
                canceller,
                statements: Mutex::new(Vec::new()),
                valid: AtomicBool::new(false),
            }),
            registry,
            closed: false,
        };

        let shared = Arc::clone(&conn.shared);
        let dsn = dsn.to_string();
        let connected = await_call(ctx, &conn.shared.canceller, move || {
            let mut native = shared.native.lock();
            if native.raw()?.connect(&dsn) {
                return Ok(());
            }
            let err = native.failure("did not connect");
            native.raw = None;
            Err(err)
        })
        .await;

        match connected {
            Ok(()) => {
                conn.shared.valid.store(true, Ordering::Release);
                tracing::debug!("connected");
                Ok(conn)
            }
            Err(err) => {
                // Frees the handle (if the connect call did not already)
                // and gives the registry slot back.
                let _ = conn.close();
                Err(err)
            }
        }
    }

    /// True between a successful connect and close.
    pub fn is_valid(&self) -> bool {
        !self.closed && self.shared.is_valid()
    }

    /// Report whether the connection is usable. No round trip is made.
    pub fn ping(&self, _ctx: &Context) -> Result<()> {
        self.shared.ensure_valid()
    }

    /// Check before reusing a pooled connection. `BadConnection` means the
    /// connection must be discarded.
    pub fn reset_session(&self, _ctx: &Context) -> Result<()> {
        self.shared.ensure_valid()
    }

    /// Disconnect and free the native handle.
    ///
    /// Uncommitted work is rolled back by the server. Statements and rows
    /// still open on this connection are freed first; using them afterwards
    /// fails with `BadConnection`. The handle is freed and the registry
    /// released even when disconnecting fails. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let was_valid = self.shared.valid.swap(false, Ordering::AcqRel);
        let mut result = Ok(());
        {
            let mut native = self.shared.native.lock();
            if was_valid {
                let disconnected = native.raw().map(|raw| raw.disconnect()).unwrap_or(true);
                if !disconnected {
                    result = Err(native.failure("disconnect"));
                }
            }
            let freed = self.shared.free_statements();
            if freed > 0 {
                tracing::debug!(statements = freed, "freed open statements on close");
            }
            native.raw = None;
        }

        self.registry.release();
        result
    }

    /// Execute a statement that returns no rows.
    pub async fn exec(&self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<ExecResult> {
        self.shared.ensure_valid()?;

        if !args.is_empty() {
            let stmt = self.prepare(ctx, query).await?;
            let result = stmt.exec(ctx, args).await;
            let closed = stmt.close();
            let result = result?;
            closed?;
            return Ok(result);
        }

        let shared = Arc::clone(&self.shared);
        let query = query.to_string();
        await_call(ctx, &self.shared.canceller, move || {
            shared.native.lock().execute_immediate(&query)
        })
        .await?;

        Ok(ExecResult::new(Arc::clone(&self.shared)))
    }

    /// Run a query. The rows free their statement when closed.
    pub async fn query(&self, ctx: &Context, query: &str, args: &[NamedValue]) -> Result<Rows> {
        self.shared.ensure_valid()?;

        if !args.is_empty() {
            let stmt = self.prepare(ctx, query).await?;
            return stmt.into_rows(ctx, args).await;
        }

        let shared = Arc::clone(&self.shared);
        let text = query.to_string();
        let raw = await_call(ctx, &self.shared.canceller, move || {
            shared.native.lock().execute_direct(&text)
        })
        .await?;

        Rows::owning(Statement::new(Arc::clone(&self.shared), raw, Vec::new()))
    }

    /// Prepare a statement, rewriting `:name` parameters to placeholders.
    pub async fn prepare(&self, ctx: &Context, query: &str) -> Result<Statement> {
        self.shared.ensure_valid()?;

        let (text, names) = split_named(query);
        let shared = Arc::clone(&self.shared);
        let raw = await_call(ctx, &self.shared.canceller, move || {
            shared.native.lock().prepare(&text)
        })
        .await?;

        tracing::debug!(params = names.len(), "prepared statement");
        Ok(Statement::new(Arc::clone(&self.shared), raw, names))
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "error closing dropped connection");
        }
    }
}
