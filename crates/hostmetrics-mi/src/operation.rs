//! Query cursors

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::MiError;
use crate::instance::Instance;
use crate::record::Record;
use crate::session::SessionShared;
use crate::unmarshal;

/// Cursor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No fetch yet
    Pending,
    /// At least one fetch done, more to come
    Streaming,
    /// Last instance delivered
    Exhausted,
    /// Provider failed mid-stream
    Failed,
    /// Closed by the caller or by its session
    Closed,
}

/// Execution of one query against a session
///
/// Pull-based: each [`Operation::get_instance`] is one provider round trip.
/// Instances are copied out when fetched and stay valid after the cursor
/// moves on or closes.
pub struct Operation {
    session: Arc<SessionShared>,
    id: u64,
    class: String,
    state: CursorState,
}

impl Operation {
    pub(crate) fn new(session: Arc<SessionShared>, id: u64, class: &str) -> Self {
        Self {
            session,
            id,
            class: class.to_string(),
            state: CursorState::Pending,
        }
    }

    #[must_use]
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Class named by the query
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Fetch the next instance
    ///
    /// Returns the instance and whether more follow. An empty result set
    /// yields `(None, false)` on the first call.
    ///
    /// # Errors
    /// [`MiError::ProtocolMisuse`] once the cursor is exhausted or failed,
    /// [`MiError::NotOpen`] after close (including a close by the session),
    /// or the provider's error.
    pub fn get_instance(&mut self) -> Result<(Option<Instance>, bool), MiError> {
        match self.state {
            CursorState::Pending | CursorState::Streaming => {}
            CursorState::Exhausted => {
                return Err(MiError::ProtocolMisuse(format!(
                    "operation on {} already returned its last instance",
                    self.class
                )));
            }
            CursorState::Failed => {
                return Err(MiError::ProtocolMisuse(format!(
                    "operation on {} failed and must be closed",
                    self.class
                )));
            }
            CursorState::Closed => return Err(MiError::NotOpen("operation")),
        }

        let mut state = self.session.lock();
        let Some(cursor) = state.cursor(self.id) else {
            self.state = CursorState::Closed;
            return Err(MiError::NotOpen("operation"));
        };

        match cursor.next() {
            Ok(fetch) => {
                trace!(
                    operation = self.id,
                    found = fetch.instance.is_some(),
                    more = fetch.more_results,
                    "fetched"
                );
                self.state = if fetch.more_results {
                    CursorState::Streaming
                } else {
                    CursorState::Exhausted
                };
                Ok((fetch.instance, fetch.more_results))
            }
            Err(e) => {
                self.state = CursorState::Failed;
                Err(e)
            }
        }
    }

    /// Drain the remaining instances
    fn drain(&mut self) -> Result<Vec<Instance>, MiError> {
        let mut instances = Vec::new();
        loop {
            let (instance, more) = self.get_instance()?;
            instances.extend(instance);
            if !more {
                return Ok(instances);
            }
        }
    }

    /// Drain the cursor and append one record per instance, in order
    ///
    /// # Errors
    /// Any fetch or decode error; `dst` is untouched on failure.
    pub fn unmarshal<T: Record>(&mut self, dst: &mut Vec<T>) -> Result<(), MiError> {
        let instances = self.drain()?;
        unmarshal::decode_all(&instances, dst)
    }

    /// Drain the cursor and decode its only instance
    ///
    /// # Errors
    /// [`MiError::UnexpectedInstanceCount`] unless exactly one instance was
    /// returned; `dst` is untouched on failure.
    pub fn unmarshal_single<T: Record>(&mut self, dst: &mut T) -> Result<(), MiError> {
        let instances = self.drain()?;
        *dst = unmarshal::decode_single(&self.class, &instances)?;
        Ok(())
    }

    /// Release the cursor, drained or not
    ///
    /// # Errors
    /// [`MiError::NotOpen`] if already closed by the caller or the session.
    pub fn close(&mut self) -> Result<(), MiError> {
        if self.state == CursorState::Closed {
            return Err(MiError::NotOpen("operation"));
        }
        self.state = CursorState::Closed;

        let mut state = self.session.lock();
        let mut cursor = state
            .take_cursor(self.id)
            .ok_or(MiError::NotOpen("operation"))?;
        debug!(session = self.session.id(), operation = self.id, "operation closed");
        cursor.close()
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        if self.state != CursorState::Closed {
            self.state = CursorState::Closed;
            let mut state = self.session.lock();
            if let Some(mut cursor) = state.take_cursor(self.id)
                && let Err(e) = cursor.close()
            {
                debug!(operation = self.id, error = %e, "error closing dropped operation");
            }
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("state", &self.state)
            .finish()
    }
}
