//! Ownership of the native API context.
//!
//! The context is initialised by the first connection and finalised when the
//! last one closes. Both transitions happen under the registry lock.

use std::sync::Arc;

use parking_lot::Mutex;

use super::native::{NativeConnection, NativeContext, NativeLibrary, SACAPI_VERSION};
use crate::error::{Error, Result};

/// Application name reported to the client library; the C API only accepts a
/// few language names here.
const APP_NAME: &str = "PHP";

struct RegistryState {
    context: Option<Box<dyn NativeContext>>,
    connections: usize,
}

pub struct Registry {
    library: Arc<dyn NativeLibrary>,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(library: Arc<dyn NativeLibrary>) -> Self {
        Self {
            library,
            state: Mutex::new(RegistryState {
                context: None,
                connections: 0,
            }),
        }
    }

    /// Allocate a connection handle, initialising the context if necessary.
    ///
    /// Every successful acquire must be paired with one [`Registry::release`].
    pub fn acquire(&self) -> Result<Box<dyn NativeConnection>> {
        let mut state = self.state.lock();

        if state.context.is_none() {
            let context = self.library.init(APP_NAME, SACAPI_VERSION).map_err(|max| {
                Error::Init(format!(
                    "requested version {}, max version {}",
                    SACAPI_VERSION, max
                ))
            })?;
            tracing::debug!(version = SACAPI_VERSION, "initialised native api");
            state.context = Some(context);
        }

        let handle = state
            .context
            .as_ref()
            .and_then(|context| context.new_connection());

        match handle {
            Some(handle) => {
                state.connections += 1;
                Ok(handle)
            }
            None => {
                Self::finish_if_idle(&mut state);
                Err(Error::Driver("did not create a new connection".to_string()))
            }
        }
    }

    /// Account for a closed (or never connected) handle.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.connections = state.connections.saturating_sub(1);
        Self::finish_if_idle(&mut state);
    }

    fn finish_if_idle(state: &mut RegistryState) {
        if state.connections == 0 {
            if let Some(context) = state.context.take() {
                drop(context);
                tracing::debug!("finalised native api");
            }
        }
    }

    /// Number of connections currently counted.
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    pub fn is_initialised(&self) -> bool {
        self.state.lock().context.is_some()
    }
}
