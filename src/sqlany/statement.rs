//! Prepared statements and parameter binding.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::connection::{NativeConn, Shared};
use super::coordinator::await_call;
use super::native::{BindParam, NativeStatement};
use super::result::ExecResult;
use super::rows::Rows;
use super::types;
use crate::context::Context;
use crate::driver::NamedValue;
use crate::error::{Error, Result};

/// Bound parameters kept alive for the duration of one execution.
#[derive(Debug, Default)]
pub(crate) struct BindArena {
    params: SmallVec<[BindParam; 8]>,
}

impl BindArena {
    fn track(&mut self, param: BindParam) -> &BindParam {
        self.params.push(param);
        &self.params[self.params.len() - 1]
    }

    pub(crate) fn release(&mut self) {
        self.params.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.params.len()
    }
}

pub(crate) struct StatementState {
    pub(crate) raw: Option<Box<dyn NativeStatement>>,
    pub(crate) arena: BindArena,
}

impl StatementState {
    pub(crate) fn raw(&mut self) -> Result<&mut Box<dyn NativeStatement>> {
        self.raw
            .as_mut()
            .ok_or_else(|| Error::Driver("statement is closed".to_string()))
    }

    /// Bind `args` in order and execute. The arena is empty afterwards
    /// whatever the outcome.
    fn execute(&mut self, native: &mut NativeConn, args: &[NamedValue]) -> Result<()> {
        self.arena.release();
        let result = self.bind_and_execute(native, args);
        self.arena.release();
        result
    }

    fn bind_and_execute(&mut self, native: &mut NativeConn, args: &[NamedValue]) -> Result<()> {
        let StatementState { raw, arena } = self;
        let raw = raw
            .as_mut()
            .ok_or_else(|| Error::Driver("statement is closed".to_string()))?;

        for arg in args {
            let value = types::encode(arg.ordinal, &arg.value)?;
            let index = arg
                .ordinal
                .checked_sub(1)
                .and_then(|i| u32::try_from(i).ok())
                .ok_or_else(|| Error::InvalidValue(format!("invalid parameter ordinal {}", arg.ordinal)))?;

            let mut param = match raw.describe_bind_param(index) {
                Some(param) => param,
                None => return Err(native.failure("could not describe bind param")),
            };
            param.value = value;

            if !raw.bind_param(index, arena.track(param)) {
                return Err(native.failure("could not bind param"));
            }
        }

        if !raw.execute() {
            return Err(native.failure("did not exec"));
        }
        Ok(())
    }
}

/// Give each named argument the position of the first parameter with that
/// name, then order arguments by position.
pub(crate) fn resolve_ordinals(names: &[String], args: &[NamedValue]) -> Vec<NamedValue> {
    let mut resolved: Vec<NamedValue> = args
        .iter()
        .map(|arg| {
            let mut arg = arg.clone();
            if let Some(name) = arg.name.as_deref().filter(|n| !n.is_empty()) {
                if let Some(i) = names.iter().position(|n| n == name) {
                    arg.ordinal = i + 1;
                }
            }
            arg
        })
        .collect();
    resolved.sort_by_key(|arg| arg.ordinal);
    resolved
}

/// The parts of a statement shared with the rows reading from it.
#[derive(Clone)]
pub(crate) struct StatementHandle {
    pub(crate) conn: Arc<Shared>,
    pub(crate) state: Arc<Mutex<StatementState>>,
}

impl StatementHandle {
    /// Free the native statement. Freeing twice is a no-op.
    fn free(&self) {
        let _native = self.conn.native.lock();
        let mut state = self.state.lock();
        state.arena.release();
        state.raw = None;
    }

    fn is_closed(&self) -> bool {
        self.state.lock().raw.is_none()
    }

    async fn execute(&self, ctx: &Context, args: Vec<NamedValue>) -> Result<()> {
        self.conn.ensure_valid()?;

        let conn = Arc::clone(&self.conn);
        let state = Arc::clone(&self.state);
        await_call(ctx, &self.conn.canceller, move || {
            let mut native = conn.native.lock();
            native.raw()?;
            state.lock().execute(&mut native, &args)
        })
        .await
    }
}

/// A statement prepared on a [`Connection`](super::Connection).
///
/// Parameters are either positional (`?`) or named (`:name`). Named
/// arguments are matched against the names found when preparing.
pub struct Statement {
    handle: StatementHandle,
    names: Vec<String>,
}

impl Statement {
    pub(crate) fn new(conn: Arc<Shared>, raw: Box<dyn NativeStatement>, names: Vec<String>) -> Self {
        let state = Arc::new(Mutex::new(StatementState {
            raw: Some(raw),
            arena: BindArena::default(),
        }));
        conn.track(&state);
        Self {
            handle: StatementHandle { conn, state },
            names,
        }
    }

    /// Number of parameters reported by the server.
    pub fn num_input(&self) -> Result<usize> {
        self.handle.conn.ensure_valid()?;
        let _native = self.handle.conn.native.lock();
        let mut state = self.handle.state.lock();
        Ok(usize::try_from(state.raw()?.num_params()).unwrap_or(0))
    }

    /// Parameter names in placeholder order.
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    /// Execute with `args`, discarding any rows.
    pub async fn exec(&self, ctx: &Context, args: &[NamedValue]) -> Result<ExecResult> {
        self.handle
            .execute(ctx, resolve_ordinals(&self.names, args))
            .await?;
        Ok(ExecResult::new(Arc::clone(&self.handle.conn)))
    }

    /// Execute with `args` and read the rows. The statement stays open after
    /// the rows are closed.
    pub async fn query(&self, ctx: &Context, args: &[NamedValue]) -> Result<Rows> {
        self.handle
            .execute(ctx, resolve_ordinals(&self.names, args))
            .await?;
        Rows::borrowing(self.handle.clone())
    }

    /// Execute and hand the statement to the rows, which free it on close.
    pub(crate) async fn into_rows(self, ctx: &Context, args: &[NamedValue]) -> Result<Rows> {
        self.handle
            .execute(ctx, resolve_ordinals(&self.names, args))
            .await?;
        Rows::owning(self)
    }

    pub(crate) fn handle(&self) -> &StatementHandle {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub(crate) fn bound(&self) -> usize {
        self.handle.state.lock().arena.len()
    }

    /// Free the statement. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        self.handle.free();
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        self.handle.free();
    }
}
