use std::sync::Arc;

use super::connection::Shared;
use crate::error::Result;

/// Outcome of an execution. Both accessors query the server.
pub struct ExecResult {
    conn: Arc<Shared>,
}

impl ExecResult {
    pub(crate) fn new(conn: Arc<Shared>) -> Self {
        Self { conn }
    }

    /// The last value generated for an identity column on this connection.
    pub fn last_insert_id(&self) -> Result<i64> {
        self.conn.ensure_valid()?;
        self.conn.native.lock().query_int("select @@identity")
    }

    pub fn rows_affected(&self) -> Result<i64> {
        self.conn.ensure_valid()?;
        self.conn.native.lock().query_int("select @@rowcount")
    }
}
