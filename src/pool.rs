//! Connection pool.
//!
//! A fixed number of permits bounds the open connections. Idle connections
//! are checked with `reset_session` before reuse; bad ones are closed and
//! replaced.

use parking_lot::Mutex;
use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::context::Context;
use crate::driver::NamedValue;
use crate::error::{Error, Result};
use crate::sqlany::{Connection, Driver, ExecResult, Row};

/// Pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Connection string handed to the native library
    pub dsn: String,
    /// Connections opened when the pool is created
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Maximum number of connections checked out at once
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

impl PoolConfig {
    pub fn new(dsn: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
        }
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// A pooled connection.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_valid() && !self.pool.semaphore.is_closed() {
                self.pool.idle.lock().push(conn);
            }
        }
    }
}

struct PoolInner {
    driver: Arc<Driver>,
    config: PoolConfig,
    idle: Mutex<Vec<Connection>>,
    semaphore: Arc<Semaphore>,
}

/// SQL Anywhere connection pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool and open `min_connections` connections.
    pub async fn connect(driver: Arc<Driver>, config: PoolConfig) -> Result<Self> {
        let inner = Arc::new(PoolInner {
            semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
            driver,
            config,
            idle: Mutex::new(Vec::new()),
        });

        let pool = Self { inner };

        let ctx = Context::background();
        for _ in 0..pool.inner.config.min_connections.min(pool.inner.config.max_connections) {
            let conn = pool.create_connection(&ctx).await?;
            pool.inner.idle.lock().push(conn);
        }

        Ok(pool)
    }

    /// Acquire a connection from the pool.
    pub async fn acquire(&self, ctx: &Context) -> Result<PooledConnection> {
        let permit = tokio::select! {
            permit = self.inner.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| Error::Pool("pool closed".to_string()))?
            }
            err = ctx.done() => return Err(err),
        };

        let conn = loop {
            let idle = self.inner.idle.lock().pop();
            let Some(mut conn) = idle else {
                break self.create_connection(ctx).await?;
            };
            match conn.reset_session(ctx) {
                Ok(()) => break conn,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding pooled connection");
                    let _ = conn.close();
                }
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Execute a statement on a pooled connection.
    pub async fn exec(&self, ctx: &Context, sql: &str, args: &[NamedValue]) -> Result<ExecResult> {
        let conn = self.acquire(ctx).await?;
        conn.exec(ctx, sql, args).await
    }

    /// Run a query on a pooled connection and collect every row.
    pub async fn query(&self, ctx: &Context, sql: &str, args: &[NamedValue]) -> Result<Vec<Row>> {
        let conn = self.acquire(ctx).await?;
        let mut rows = conn.query(ctx, sql, args).await?;

        let mut collected = Vec::new();
        while let Some(row) = rows.next(ctx).await? {
            collected.push(row);
        }
        rows.close()?;
        Ok(collected)
    }

    /// Number of idle connections.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Close all idle connections. Checked-out connections are closed when
    /// returned.
    pub fn close(&self) {
        self.inner.semaphore.close();
        let connections = {
            let mut idle = self.inner.idle.lock();
            std::mem::take(&mut *idle)
        };

        for mut conn in connections {
            if let Err(err) = conn.close() {
                tracing::warn!(error = %err, "error closing pooled connection");
            }
        }
    }

    async fn create_connection(&self, ctx: &Context) -> Result<Connection> {
        self.inner.driver.open(ctx, &self.inner.config.dsn).await
    }
}
