//! Scripted in-memory native library for tests.
//!
//! Statements are answered from scripts keyed by SQL text. A handful of
//! statements the driver issues itself (transaction control, connection
//! properties, `@@identity`, `@@rowcount`) are understood directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::native::*;

pub const CODE_INTERRUPTED: i32 = -299;
pub const CODE_BAD_LOGIN: i32 = -103;

#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: Vec<(String, NativeType)>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
}

impl ResultSet {
    pub fn new(columns: &[(&str, NativeType)]) -> Self {
        Self {
            columns: columns.iter().map(|(n, t)| (n.to_string(), *t)).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: Vec<Option<Vec<u8>>>) -> Self {
        self.rows.push(values);
        self
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    /// Result sets produced on execute.
    Rows(Vec<ResultSet>),
    /// One row echoing the bound parameters, typed per column.
    Echo(Vec<NativeType>),
    /// Execute succeeds and sets `@@rowcount` / `@@identity`.
    Affects { rows: i64, identity: i64 },
    /// Execute fails with the given code and message.
    Fail(i32, String),
    /// Prepare fails with the given code and message.
    FailPrepare(i32, String),
    /// Execute blocks for the duration unless cancelled.
    Block(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub sql: String,
    pub params: Vec<(u32, BindValue)>,
}

#[derive(Default)]
pub struct Faults {
    pub init: AtomicBool,
    pub new_connection: AtomicBool,
    pub commit: AtomicBool,
    pub rollback: AtomicBool,
    pub disconnect: AtomicBool,
    pub set_isolation: AtomicBool,
    pub column_info: AtomicBool,
    pub fetch: AtomicBool,
}

#[derive(Default)]
pub struct FakeServer {
    pub inits: AtomicUsize,
    pub finis: AtomicUsize,
    pub overlaps: AtomicUsize,
    pub faults: Faults,
    scripts: Mutex<HashMap<String, Script>>,
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl FakeServer {
    pub fn script(&self, sql: &str, script: Script) {
        self.scripts.lock().insert(sql.to_string(), script);
    }

    fn lookup(&self, sql: &str) -> Option<Script> {
        self.scripts.lock().get(sql).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Arc<Session> {
        self.sessions
            .lock()
            .last()
            .cloned()
            .expect("no connection was created")
    }
}

/// Per-connection server state, shared with the connection's statements.
pub struct Session {
    pub server: Arc<FakeServer>,
    pub events: Mutex<Vec<String>>,
    pub executions: Mutex<Vec<Execution>>,
    pub isolation: Mutex<String>,
    pub live_statements: AtomicUsize,
    pub freed: AtomicBool,
    /// Statements still alive when the connection was freed.
    pub live_at_free: Mutex<Option<usize>>,
    error: Mutex<Option<(i32, String)>>,
    identity: Mutex<i64>,
    rowcount: Mutex<i64>,
    busy: AtomicBool,
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Session {
    fn new(server: Arc<FakeServer>) -> Self {
        Self {
            server,
            events: Mutex::new(Vec::new()),
            executions: Mutex::new(Vec::new()),
            isolation: Mutex::new("0".to_string()),
            live_statements: AtomicUsize::new(0),
            freed: AtomicBool::new(false),
            live_at_free: Mutex::new(None),
            error: Mutex::new(None),
            identity: Mutex::new(0),
            rowcount: Mutex::new(0),
            busy: AtomicBool::new(false),
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.executions.lock().clone()
    }

    /// The error a native call left behind and nobody cleared.
    pub fn pending_error(&self) -> Option<(i32, String)> {
        self.error.lock().clone()
    }

    fn event(&self, e: impl Into<String>) {
        self.events.lock().push(e.into());
    }

    fn fail(&self, code: i32, message: &str) -> bool {
        *self.error.lock() = Some((code, message.to_string()));
        false
    }

    /// Mark a native call in flight; overlapping calls are counted.
    fn enter(&self) -> BusyGuard<'_> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.server.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        BusyGuard(self)
    }

    /// Block until cancelled or `duration` passes. Returns false when interrupted.
    fn block(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.wake.wait_until(&mut cancelled, until).timed_out() {
                return true;
            }
        }
        *cancelled = false;
        self.fail(CODE_INTERRUPTED, "Statement interrupted by user")
    }
}

struct BusyGuard<'a>(&'a Session);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

pub struct FakeLibrary {
    pub server: Arc<FakeServer>,
}

impl FakeLibrary {
    pub fn new() -> (Arc<Self>, Arc<FakeServer>) {
        let server = Arc::new(FakeServer::default());
        (
            Arc::new(Self {
                server: Arc::clone(&server),
            }),
            server,
        )
    }
}

impl NativeLibrary for FakeLibrary {
    fn init(&self, _app_name: &str, version: u32) -> Result<Box<dyn NativeContext>, u32> {
        if self.server.faults.init.load(Ordering::SeqCst) {
            return Err(version - 1);
        }
        self.server.inits.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            server: Arc::clone(&self.server),
        }))
    }
}

struct FakeContext {
    server: Arc<FakeServer>,
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.server.finis.fetch_add(1, Ordering::SeqCst);
    }
}

impl NativeContext for FakeContext {
    fn new_connection(&self) -> Option<Box<dyn NativeConnection>> {
        if self.server.faults.new_connection.load(Ordering::SeqCst) {
            return None;
        }
        let session = Arc::new(Session::new(Arc::clone(&self.server)));
        self.server.sessions.lock().push(Arc::clone(&session));
        Some(Box::new(FakeConnection { session }))
    }
}

struct FakeCancel {
    session: Arc<Session>,
}

impl NativeCancel for FakeCancel {
    fn cancel(&self) {
        // Nothing to interrupt when no request is outstanding.
        if self.session.busy.load(Ordering::SeqCst) {
            *self.session.cancelled.lock() = true;
            self.session.wake.notify_all();
        }
    }
}

struct FakeConnection {
    session: Arc<Session>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        let live = self.session.live_statements.load(Ordering::SeqCst);
        *self.session.live_at_free.lock() = Some(live);
        self.session.freed.store(true, Ordering::SeqCst);
    }
}

const PROPERTY_PREFIX: &str = "SELECT CONNECTION_PROPERTY('";
const SET_ISOLATION: &str = "SET TEMPORARY OPTION isolation_level = ";

impl FakeConnection {
    fn statement(&self, sql: &str) -> Option<Box<dyn NativeStatement>> {
        if let Some(Script::FailPrepare(code, message)) = self.session.server.lookup(sql) {
            self.session.fail(code, &message);
            return None;
        }
        self.session.live_statements.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(FakeStatement {
            session: Arc::clone(&self.session),
            sql: sql.to_string(),
            num_params: sql.matches('?').count(),
            params: HashMap::new(),
            sets: Vec::new(),
            current: 0,
            cursor: None,
        }))
    }
}

impl NativeConnection for FakeConnection {
    fn connect(&mut self, dsn: &str) -> bool {
        let _busy = self.session.enter();
        if let Some(Script::Block(d)) = self.session.server.lookup(dsn) {
            if !self.session.block(d) {
                return false;
            }
        }
        if dsn.contains("pwd=wrong") {
            return self
                .session
                .fail(CODE_BAD_LOGIN, "Invalid user ID or password");
        }
        self.session.event("connect");
        true
    }

    fn disconnect(&mut self) -> bool {
        let _busy = self.session.enter();
        self.session.event("disconnect");
        if self.session.server.faults.disconnect.load(Ordering::SeqCst) {
            return self.session.fail(-308, "Connection was terminated");
        }
        true
    }

    fn execute_immediate(&mut self, sql: &str) -> bool {
        let _busy = self.session.enter();
        if let Some(level) = sql.strip_prefix(SET_ISOLATION) {
            if self.session.server.faults.set_isolation.load(Ordering::SeqCst) {
                return self.session.fail(-200, "Invalid option 'isolation_level'");
            }
            *self.session.isolation.lock() = level.to_string();
            self.session.event(format!("isolation {}", level));
            return true;
        }
        if sql == "BEGIN TRANSACTION" {
            self.session.event("begin");
            return true;
        }
        self.session.executions.lock().push(Execution {
            sql: sql.to_string(),
            params: Vec::new(),
        });
        match self.session.server.lookup(sql) {
            Some(Script::Fail(code, message)) => self.session.fail(code, &message),
            Some(Script::Block(d)) => self.session.block(d),
            Some(Script::Affects { rows, identity }) => {
                *self.session.rowcount.lock() = rows;
                *self.session.identity.lock() = identity;
                true
            }
            _ => true,
        }
    }

    fn execute_direct(&mut self, sql: &str) -> Option<Box<dyn NativeStatement>> {
        let mut stmt = self.statement(sql)?;
        if stmt.execute() {
            Some(stmt)
        } else {
            None
        }
    }

    fn prepare(&mut self, sql: &str) -> Option<Box<dyn NativeStatement>> {
        let _busy = self.session.enter();
        self.session.event(format!("prepare {}", sql));
        self.statement(sql)
    }

    fn commit(&mut self) -> bool {
        let _busy = self.session.enter();
        self.session.event("commit");
        if self.session.server.faults.commit.load(Ordering::SeqCst) {
            return self.session.fail(-1, "commit failed");
        }
        true
    }

    fn rollback(&mut self) -> bool {
        let _busy = self.session.enter();
        self.session.event("rollback");
        if self.session.server.faults.rollback.load(Ordering::SeqCst) {
            return self.session.fail(-1, "rollback failed");
        }
        true
    }

    fn error(&self, buf: &mut [u8]) -> i32 {
        match &*self.session.error.lock() {
            Some((code, message)) => {
                let n = message.len().min(buf.len().saturating_sub(1));
                buf[..n].copy_from_slice(&message.as_bytes()[..n]);
                if n < buf.len() {
                    buf[n] = 0;
                }
                *code
            }
            None => 0,
        }
    }

    fn clear_error(&mut self) {
        *self.session.error.lock() = None;
    }

    fn canceller(&self) -> Arc<dyn NativeCancel> {
        Arc::new(FakeCancel {
            session: Arc::clone(&self.session),
        })
    }
}

struct FakeStatement {
    session: Arc<Session>,
    sql: String,
    num_params: usize,
    params: HashMap<u32, BindParam>,
    sets: Vec<ResultSet>,
    current: usize,
    cursor: Option<usize>,
}

impl Drop for FakeStatement {
    fn drop(&mut self) {
        self.session.live_statements.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeStatement {
    fn int_result(name: &str, native_type: NativeType, bytes: Vec<u8>) -> ResultSet {
        ResultSet::new(&[(name, native_type)]).row(vec![Some(bytes)])
    }

    fn builtin(&self) -> Option<ResultSet> {
        if let Some(rest) = self.sql.strip_prefix(PROPERTY_PREFIX) {
            let property = rest.trim_end_matches("')");
            let value = match property {
                "isolation_level" => self.session.isolation.lock().clone(),
                _ => String::new(),
            };
            return Some(
                ResultSet::new(&[("connection_property", NativeType::LONGVARCHAR)])
                    .row(vec![Some(value.into_bytes())]),
            );
        }
        match self.sql.as_str() {
            "select @@identity" => Some(Self::int_result(
                "@@identity",
                NativeType::UNSBIGINT,
                (*self.session.identity.lock() as u64).to_le_bytes().to_vec(),
            )),
            "select @@rowcount" => Some(Self::int_result(
                "@@rowcount",
                NativeType::INT,
                (*self.session.rowcount.lock() as i32).to_le_bytes().to_vec(),
            )),
            _ => None,
        }
    }

    fn row(&self) -> Option<&Vec<Option<Vec<u8>>>> {
        let set = self.sets.get(self.current)?;
        set.rows.get(self.cursor?)
    }
}

impl NativeStatement for FakeStatement {
    fn num_params(&self) -> i32 {
        self.num_params as i32
    }

    fn describe_bind_param(&mut self, index: u32) -> Option<BindParam> {
        if index as usize >= self.num_params {
            self.session.fail(-689, "Input parameter index out of range");
            return None;
        }
        Some(BindParam {
            direction: Direction::Input,
            name: format!("p{}", index),
            value: BindValue::default(),
        })
    }

    fn bind_param(&mut self, index: u32, param: &BindParam) -> bool {
        if index as usize >= self.num_params {
            return self.session.fail(-689, "Input parameter index out of range");
        }
        self.params.insert(index, param.clone());
        true
    }

    fn execute(&mut self) -> bool {
        let _busy = self.session.enter();
        let mut params: Vec<(u32, BindValue)> = self
            .params
            .iter()
            .map(|(i, p)| (*i, p.value.clone()))
            .collect();
        params.sort_by_key(|(i, _)| *i);
        self.session.executions.lock().push(Execution {
            sql: self.sql.clone(),
            params: params.clone(),
        });

        self.current = 0;
        self.cursor = None;
        self.sets.clear();

        if let Some(set) = self.builtin() {
            self.sets.push(set);
            return true;
        }

        match self.session.server.lookup(&self.sql) {
            Some(Script::Rows(sets)) => self.sets = sets,
            Some(Script::Echo(types)) => {
                let mut set = ResultSet::default();
                let mut row = Vec::new();
                for (i, t) in types.iter().enumerate() {
                    set.columns.push((format!("c{}", i), *t));
                    let value = params
                        .iter()
                        .find(|(index, _)| *index as usize == i)
                        .and_then(|(_, v)| (!v.is_null).then(|| v.buffer.to_vec()));
                    row.push(value);
                }
                set.rows.push(row);
                self.sets.push(set);
            }
            Some(Script::Affects { rows, identity }) => {
                *self.session.rowcount.lock() = rows;
                *self.session.identity.lock() = identity;
            }
            Some(Script::Fail(code, message)) => return self.session.fail(code, &message),
            Some(Script::Block(d)) => return self.session.block(d),
            Some(Script::FailPrepare(..)) | None => {}
        }
        true
    }

    fn reset(&mut self) -> bool {
        self.cursor = None;
        self.params.clear();
        true
    }

    fn num_cols(&self) -> i32 {
        self.sets
            .get(self.current)
            .map_or(0, |s| s.columns.len() as i32)
    }

    fn column_info(&self, index: u32) -> Option<ColumnInfo> {
        if self.session.server.faults.column_info.load(Ordering::SeqCst) {
            self.session.fail(-2, "Column description unavailable");
            return None;
        }
        let (name, native_type) = self.sets.get(self.current)?.columns.get(index as usize)?;
        Some(ColumnInfo {
            name: name.clone(),
            data_type: DataType::Invalid,
            native_type: *native_type,
            max_size: 0,
            nullable: true,
        })
    }

    fn fetch_next(&mut self) -> bool {
        let _busy = self.session.enter();
        if self.session.server.faults.fetch.load(Ordering::SeqCst) {
            return self.session.fail(CODE_INTERRUPTED, "Statement interrupted by user");
        }
        let next = self.cursor.map_or(0, |c| c + 1);
        let len = self.sets.get(self.current).map_or(0, |s| s.rows.len());
        if next >= len {
            self.cursor = Some(len);
            return self.session.fail(SQLCODE_NO_DATA, "Row not found");
        }
        self.cursor = Some(next);
        true
    }

    fn fetch_absolute(&mut self, row: i32) -> bool {
        let _busy = self.session.enter();
        let len = self.sets.get(self.current).map_or(0, |s| s.rows.len());
        if row < 1 || row as usize > len {
            return self.session.fail(SQLCODE_NO_DATA, "Row not found");
        }
        self.cursor = Some(row as usize - 1);
        true
    }

    fn get_column(&self, index: u32) -> Option<ColumnData<'_>> {
        let value = self.row()?.get(index as usize)?;
        Some(ColumnData {
            data_type: DataType::Invalid,
            buffer: value.as_deref().unwrap_or(&[]),
            is_null: value.is_none(),
        })
    }

    fn next_result(&mut self) -> bool {
        let _busy = self.session.enter();
        if self.current + 1 >= self.sets.len() {
            return self
                .session
                .fail(SQLCODE_NO_MORE_RESULTS, "Procedure has completed");
        }
        self.current += 1;
        self.cursor = None;
        true
    }
}
