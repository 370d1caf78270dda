//! Reading result sets.

use std::sync::Arc;

use smallvec::SmallVec;

use super::connection::NativeConn;
use super::coordinator::await_call;
use super::native::{NativeStatement, NativeType, SQLCODE_NO_MORE_RESULTS};
use super::statement::{Statement, StatementHandle};
use super::types;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::Value;

/// One fetched row.
pub type Row = SmallVec<[Value; 16]>;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub native_type: NativeType,
}

/// Column names and declared types of the current result set.
fn describe(native: &mut NativeConn, stmt: &dyn NativeStatement) -> Result<Vec<Column>> {
    let count = u32::try_from(stmt.num_cols()).unwrap_or(0);
    (0..count)
        .map(|i| match stmt.column_info(i) {
            Some(info) => Ok(Column {
                name: info.name,
                native_type: info.native_type,
            }),
            None => Err(native.failure("did not get column info")),
        })
        .collect()
}

fn fetch(
    native: &mut NativeConn,
    stmt: &mut dyn NativeStatement,
    ctx: &Context,
    columns: &[NativeType],
) -> Result<Option<Row>> {
    if !stmt.fetch_next() {
        if ctx.err().is_some() {
            native.last_error("");
            return Ok(None);
        }
        return match native.last_error("could not fetch next") {
            None | Some(Error::EndOfData) => Ok(None),
            Some(err) => Err(err),
        };
    }

    let mut row = Row::new();
    for (i, native_type) in columns.iter().enumerate() {
        let data = match stmt.get_column(i as u32) {
            Some(data) => data,
            None => return Err(native.failure("could not get data")),
        };
        row.push(types::decode(*native_type, &data)?);
    }
    Ok(Some(row))
}

/// Rows produced by a query.
///
/// Rows from an ad-hoc query own their statement and free it when closed.
/// Rows from [`Statement::query`] leave the statement open.
pub struct Rows {
    handle: StatementHandle,
    owned: Option<Statement>,
    columns: Vec<Column>,
    types: Arc<[NativeType]>,
    closed: bool,
}

impl Rows {
    pub(crate) fn owning(stmt: Statement) -> Result<Self> {
        let handle = stmt.handle().clone();
        Self::open(handle, Some(stmt))
    }

    pub(crate) fn borrowing(handle: StatementHandle) -> Result<Self> {
        Self::open(handle, None)
    }

    fn open(handle: StatementHandle, owned: Option<Statement>) -> Result<Self> {
        handle.conn.ensure_valid()?;
        let columns = {
            let mut native = handle.conn.native.lock();
            let mut state = handle.state.lock();
            describe(&mut native, state.raw()?.as_ref())?
        };

        let mut rows = Self {
            handle,
            owned,
            columns: Vec::new(),
            types: Arc::from(Vec::new()),
            closed: false,
        };
        rows.set_columns(columns);
        Ok(rows)
    }

    fn set_columns(&mut self, columns: Vec<Column>) {
        self.types = columns.iter().map(|c| c.native_type).collect();
        self.columns = columns;
    }

    /// Column names of the current result set.
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Declared native types of the current result set.
    pub fn column_types(&self) -> &[NativeType] {
        &self.types
    }

    /// Fetch the next row; `None` at the end of the result set.
    pub async fn next(&mut self, ctx: &Context) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        self.handle.conn.ensure_valid()?;

        let handle = self.handle.clone();
        let types = Arc::clone(&self.types);
        let fetch_ctx = ctx.clone();
        await_call(ctx, &self.handle.conn.canceller, move || {
            let mut native = handle.conn.native.lock();
            native.raw()?;
            let mut state = handle.state.lock();
            fetch(&mut native, state.raw()?.as_mut(), &fetch_ctx, &types)
        })
        .await
    }

    /// Always true; whether another result set exists is only known by
    /// trying to advance to it.
    pub fn has_next_result_set(&self) -> bool {
        true
    }

    /// Advance to the next result set. `false` when there are none left.
    pub async fn next_result_set(&mut self, ctx: &Context) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.handle.conn.ensure_valid()?;

        let handle = self.handle.clone();
        let advanced = await_call(ctx, &self.handle.conn.canceller, move || {
            let mut native = handle.conn.native.lock();
            native.raw()?;
            let mut state = handle.state.lock();
            let stmt = state.raw()?;
            if stmt.next_result() {
                return describe(&mut native, stmt.as_ref()).map(Some);
            }
            match native.last_error("could not get next result set") {
                None | Some(Error::EndOfData) => Ok(None),
                Some(err) if err.native_code() == Some(SQLCODE_NO_MORE_RESULTS) => Ok(None),
                Some(err) => Err(err),
            }
        })
        .await?;

        match advanced {
            Some(columns) => {
                self.set_columns(columns);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reset the cursor, freeing the statement if these rows own it.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = {
            let mut native = self.handle.conn.native.lock();
            let mut state = self.handle.state.lock();
            let reset = match state.raw.as_mut() {
                Some(stmt) if native.raw().is_ok() => stmt.reset(),
                _ => true,
            };
            if reset {
                Ok(())
            } else {
                Err(native.failure("could not reset statement"))
            }
        };

        if let Some(stmt) = self.owned.take() {
            stmt.close()?;
        }
        result
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "error closing dropped rows");
        }
    }
}
