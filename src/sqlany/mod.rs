//! SQL Anywhere driver.
//!
//! Built on a blocking native client library reached through the traits in
//! [`native`]. Every blocking call goes through the coordinator so a caller's
//! [`Context`] can interrupt it.

mod coordinator;
pub mod connection;
pub mod named;
pub mod native;
mod registry;
pub mod result;
pub mod rows;
pub mod statement;
pub mod time;
pub mod transaction;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

pub use connection::Connection;
pub use native::NativeLibrary;
pub use registry::Registry;
pub use result::ExecResult;
pub use rows::{Column, Row, Rows};
pub use statement::Statement;
pub use transaction::Transaction;
pub use types::Value;

/// Opens connections through one native library.
pub struct Driver {
    registry: Arc<Registry>,
}

impl Driver {
    /// A driver with its own API registry over `library`.
    ///
    /// The registry initialises the library on the first connection and
    /// finalises it after the last, so create one driver per library and
    /// share it. The driver installed by [`crate::register`] is that shared
    /// instance for the process.
    pub fn new(library: Arc<dyn NativeLibrary>) -> Self {
        Self {
            registry: Arc::new(Registry::new(library)),
        }
    }

    /// Open a connection. `dsn` is passed to the library unchanged.
    pub async fn open(&self, ctx: &Context, dsn: &str) -> Result<Connection> {
        Connection::connect(ctx, Arc::clone(&self.registry), dsn).await
    }

    /// A connector bound to `dsn`, for opening connections repeatedly.
    pub fn connector(self: &Arc<Self>, dsn: &str) -> Connector {
        Connector {
            driver: Arc::clone(self),
            dsn: dsn.to_string(),
        }
    }

    /// Connections currently open through this driver.
    pub fn open_connections(&self) -> usize {
        self.registry.connections()
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

/// A driver paired with a connection string.
#[derive(Clone)]
pub struct Connector {
    driver: Arc<Driver>,
    dsn: String,
}

impl Connector {
    pub async fn connect(&self, ctx: &Context) -> Result<Connection> {
        self.driver.open(ctx, &self.dsn).await
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The dsn carries credentials.
        f.debug_struct("Connector").finish_non_exhaustive()
    }
}
