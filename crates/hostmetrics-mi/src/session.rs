//! Sessions against a management provider

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, instrument, warn};

use crate::error::MiError;
use crate::operation::Operation;
use crate::provider::{Namespace, OperationFlags, ProviderCursor, ProviderSession};
use crate::query::{Dialect, Query};
use crate::record::Record;

/// Native state shared between a session and its operations
pub(crate) struct SessionShared {
    id: u64,
    state: Mutex<SessionState>,
}

pub(crate) struct SessionState {
    native: Option<Box<dyn ProviderSession>>,
    cursors: HashMap<u64, Box<dyn ProviderCursor>>,
    next_cursor: u64,
}

impl SessionState {
    /// Cursor owned by operation `id`, if it is still open
    pub(crate) fn cursor(&mut self, id: u64) -> Option<&mut Box<dyn ProviderCursor>> {
        self.cursors.get_mut(&id)
    }

    pub(crate) fn take_cursor(&mut self, id: u64) -> Option<Box<dyn ProviderCursor>> {
        self.cursors.remove(&id)
    }
}

impl SessionShared {
    /// Lock the native state. A panic in another scrape does not poison the
    /// session: every mutation below leaves the state consistent.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.lock().native.is_some()
    }

    /// Close every open cursor, then the session handle. Keeps going past
    /// failures and reports the first one.
    pub(crate) fn close(&self) -> Result<(), MiError> {
        let mut state = self.lock();
        let mut native = state.native.take().ok_or(MiError::NotOpen("session"))?;

        let mut first_error = None;
        let cursors: Vec<_> = state.cursors.drain().collect();
        if !cursors.is_empty() {
            debug!(session = self.id, count = cursors.len(), "force-closing open operations");
        }
        for (id, mut cursor) in cursors {
            if let Err(e) = cursor.close() {
                warn!(session = self.id, operation = id, error = %e, "failed to close operation");
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = native.close() {
            first_error.get_or_insert(e);
        }
        debug!(session = self.id, "session closed");

        first_error.map_or(Ok(()), Err)
    }
}

/// A live channel to a provider namespace
///
/// Operations started from one session are serialized: each native call
/// holds the session lock for its duration. Closing the session force-closes
/// any operation still open.
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    pub(crate) fn new(id: u64, native: Box<dyn ProviderSession>) -> Self {
        debug!(session = id, "session opened");
        Self {
            shared: Arc::new(SessionShared {
                id,
                state: Mutex::new(SessionState {
                    native: Some(native),
                    cursors: HashMap::new(),
                    next_cursor: 0,
                }),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Verify the provider is reachable without running a query
    ///
    /// # Errors
    /// [`MiError::NotOpen`] after close, or the provider's connection error.
    #[instrument(skip(self), fields(session = self.shared.id()))]
    pub fn test_connection(&self) -> Result<(), MiError> {
        let mut state = self.shared.lock();
        let native = state.native.as_mut().ok_or(MiError::NotOpen("session"))?;
        native.test_connection()
    }

    /// Start a query and return its cursor
    ///
    /// # Errors
    /// [`MiError::NotOpen`] after close, or [`MiError::Execution`] when the
    /// provider rejects the query.
    #[instrument(skip(self, query), fields(session = self.shared.id(), query = %query))]
    pub fn query_instances(
        &self,
        flags: OperationFlags,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<Operation, MiError> {
        let mut state = self.shared.lock();
        let native = state.native.as_mut().ok_or(MiError::NotOpen("session"))?;
        let cursor = native.execute(flags, namespace, query)?;

        let id = state.next_cursor;
        state.next_cursor += 1;
        state.cursors.insert(id, cursor);
        debug!(operation = id, "operation started");

        Ok(Operation::new(Arc::clone(&self.shared), id, query.class()))
    }

    /// Compile `text` in `dialect` and start it
    ///
    /// # Errors
    /// [`MiError::Compile`] for malformed text, otherwise as
    /// [`Session::query_instances`].
    pub fn query_instances_text(
        &self,
        flags: OperationFlags,
        namespace: &Namespace,
        dialect: Dialect,
        text: &str,
    ) -> Result<Operation, MiError> {
        let query = Query::parse_with_dialect(text, dialect)?;
        self.query_instances(flags, namespace, &query)
    }

    /// Run a query to exhaustion and append one record per instance
    ///
    /// # Errors
    /// Any execution or decode error; `dst` is untouched on failure.
    pub fn query_unmarshal<T: Record>(
        &self,
        dst: &mut Vec<T>,
        flags: OperationFlags,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<(), MiError> {
        let mut operation = self.query_instances(flags, namespace, query)?;
        let result = operation.unmarshal(dst);
        let closed = operation.close();
        result?;
        closed
    }

    /// Run a query that must yield exactly one instance
    ///
    /// # Errors
    /// [`MiError::UnexpectedInstanceCount`] for zero or several instances,
    /// otherwise as [`Session::query_unmarshal`]. `dst` is untouched on failure.
    pub fn query_unmarshal_single<T: Record>(
        &self,
        dst: &mut T,
        flags: OperationFlags,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<(), MiError> {
        let mut operation = self.query_instances(flags, namespace, query)?;
        let result = operation.unmarshal_single(dst);
        let closed = operation.close();
        result?;
        closed
    }

    /// [`Session::query_unmarshal`] with standard flags
    ///
    /// # Errors
    /// As [`Session::query_unmarshal`].
    pub fn query<T: Record>(
        &self,
        dst: &mut Vec<T>,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<(), MiError> {
        self.query_unmarshal(dst, OperationFlags::STANDARD_RTTI, namespace, query)
    }

    /// Close the session and any operation still open on it
    ///
    /// # Errors
    /// [`MiError::NotOpen`] on a second close, or the first provider error
    /// hit while releasing handles.
    pub fn close(&mut self) -> Result<(), MiError> {
        self.shared.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.shared.is_open()
            && let Err(e) = self.shared.close()
        {
            debug!(error = %e, "error closing dropped session");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id())
            .field("open", &self.is_open())
            .finish()
    }
}
