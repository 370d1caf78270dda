//! Driver registration and the vocabulary shared with callers.
//!
//! Drivers are registered under a name and opened by that name with an
//! opaque connection string, which is handed to the native library verbatim.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::sqlany::{Connection, Driver};
use crate::Value;

static DRIVERS: Lazy<RwLock<HashMap<String, Arc<Driver>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Make a driver available under `name`. Registering a name twice fails.
pub fn register(name: &str, driver: Arc<Driver>) -> Result<()> {
    let mut drivers = DRIVERS.write();
    if drivers.contains_key(name) {
        return Err(Error::Driver(format!("register called twice for driver {}", name)));
    }
    drivers.insert(name.to_string(), driver);
    Ok(())
}

/// Look up a registered driver.
pub fn lookup(name: &str) -> Result<Arc<Driver>> {
    DRIVERS
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::Driver(format!("unknown driver {:?} (forgotten register?)", name)))
}

/// Names of all registered drivers, sorted.
pub fn drivers() -> Vec<String> {
    let mut names: Vec<String> = DRIVERS.read().keys().cloned().collect();
    names.sort();
    names
}

/// Open a connection through the driver registered under `name`.
pub async fn open(name: &str, ctx: &Context, dsn: &str) -> Result<Connection> {
    lookup(name)?.open(ctx, dsn).await
}

// ============================================================================
// Arguments
// ============================================================================

/// A bound argument: its 1-based position and, optionally, its name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub ordinal: usize,
    pub name: Option<String>,
    pub value: Value,
}

impl NamedValue {
    pub fn new(ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            ordinal,
            name: None,
            value: value.into(),
        }
    }

    pub fn named(ordinal: usize, name: &str, value: impl Into<Value>) -> Self {
        Self {
            ordinal,
            name: Some(name.to_string()),
            value: value.into(),
        }
    }
}

/// Positional arguments, numbered from 1.
pub fn args<I, V>(values: I) -> Vec<NamedValue>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| NamedValue::new(i + 1, v))
        .collect()
}

/// Named arguments; each also carries its position in the list.
pub fn named<'a, I, V>(pairs: I) -> Vec<NamedValue>
where
    I: IntoIterator<Item = (&'a str, V)>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .enumerate()
        .map(|(i, (name, v))| NamedValue::named(i + 1, name, v))
        .collect()
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    pub fn isolation(isolation: IsolationLevel) -> Self {
        Self {
            isolation,
            read_only: false,
        }
    }
}
