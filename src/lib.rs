//! sqlanywhere - an async SQL Anywhere driver over the native client library.
//!
//! Blocking library calls run under a caller-supplied [`Context`]; when the
//! context is cancelled or its deadline passes, the outstanding call is
//! interrupted and the connection stays usable.
//!
//! ```ignore
//! sqlanywhere::register(library)?;
//! let ctx = Context::with_timeout(Duration::from_secs(5));
//! let conn = driver::open(sqlanywhere::DRIVER_NAME, &ctx, "uid=dba;pwd=sql").await?;
//! let mut rows = conn.query(&ctx, "SELECT :id AS id", &driver::named([("id", 1i64)])).await?;
//! while let Some(row) = rows.next(&ctx).await? {
//!     println!("{:?}", row);
//! }
//! ```

use std::sync::Arc;

pub mod context;
pub mod driver;
mod error;
pub mod pool;
pub mod sqlany;

pub use context::{CancelHandle, Context};
pub use driver::{IsolationLevel, NamedValue, TxOptions};
pub use error::{Error, NativeError, Result};
pub use pool::{Pool, PoolConfig, PooledConnection};
pub use sqlany::native::NativeLibrary;
pub use sqlany::{Connection, Driver, ExecResult, Row, Rows, Statement, Transaction, Value};

/// Name the driver registers under.
pub const DRIVER_NAME: &str = "sqlanywhere";

/// Register a driver over `library` as [`DRIVER_NAME`].
pub fn register(library: Arc<dyn NativeLibrary>) -> Result<()> {
    driver::register(DRIVER_NAME, Arc::new(Driver::new(library)))
}
