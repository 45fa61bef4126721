//! Connection factory

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::error::MiError;
use crate::options::DestinationOptions;
use crate::provider::Provider;
use crate::session::{Session, SessionShared};

/// Handle to an initialized management runtime
///
/// Constructed once at process start and passed to whatever needs sessions.
/// Closing it force-closes every session it created that is still open.
pub struct Application {
    provider: Arc<dyn Provider>,
    sessions: Mutex<Vec<Weak<SessionShared>>>,
    next_session: AtomicU64,
    open: bool,
}

impl Application {
    /// Initialize the provider runtime
    ///
    /// # Errors
    /// [`MiError::Unavailable`] when the runtime cannot be brought up, or
    /// [`MiError::ProtocolMisuse`] when this provider is already initialized.
    pub fn initialize(provider: Arc<dyn Provider>) -> Result<Self, MiError> {
        provider.initialize()?;
        info!(provider = provider.name(), "management runtime initialized");

        Ok(Self {
            provider,
            sessions: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(0),
            open: true,
        })
    }

    /// Fresh options with provider defaults
    #[must_use]
    pub fn new_destination_options(&self) -> DestinationOptions {
        DestinationOptions::new()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open a session; `None` uses provider defaults
    ///
    /// # Errors
    /// [`MiError::NotOpen`] after close, otherwise the provider's
    /// [`MiError::ConnectionFailed`] or [`MiError::Timeout`].
    pub fn new_session(&self, options: Option<&DestinationOptions>) -> Result<Session, MiError> {
        if !self.open {
            return Err(MiError::NotOpen("application"));
        }

        let defaults = DestinationOptions::default();
        let options = options.unwrap_or(&defaults);
        let native = self.provider.open_session(options)?;

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(id, native);

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|s| s.strong_count() > 0);
        sessions.push(Arc::downgrade(session.shared()));

        Ok(session)
    }

    /// Force-close remaining sessions and shut the runtime down
    ///
    /// # Errors
    /// [`MiError::NotOpen`] on a second close, or the first error hit while
    /// releasing sessions or the runtime.
    pub fn close(&mut self) -> Result<(), MiError> {
        if !self.open {
            return Err(MiError::NotOpen("application"));
        }
        self.open = false;

        let sessions = std::mem::take(
            &mut *self.sessions.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let mut first_error = None;
        for shared in sessions.iter().filter_map(Weak::upgrade) {
            if !shared.is_open() {
                continue;
            }
            debug!(session = shared.id(), "force-closing session");
            if let Err(e) = shared.close() {
                warn!(session = shared.id(), error = %e, "failed to close session");
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.provider.shutdown() {
            first_error.get_or_insert(e);
        }
        info!(provider = self.provider.name(), "management runtime shut down");

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if self.open
            && let Err(e) = self.close()
        {
            debug!(error = %e, "error closing dropped application");
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("provider", &self.provider.name())
            .field("open", &self.open)
            .finish()
    }
}
