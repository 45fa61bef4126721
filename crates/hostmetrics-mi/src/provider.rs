//! Native provider boundary
//!
//! These traits are what a platform binding implements: the management
//! runtime handle, a session handle and a result cursor. Each `close`
//! releases exactly one native handle and is called exactly once by the
//! wrappers in this crate.

use std::borrow::Cow;
use std::fmt;

use crate::error::MiError;
use crate::instance::Instance;
use crate::options::DestinationOptions;
use crate::query::Query;

/// Result-shape hint passed through to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationFlags(u32);

impl OperationFlags {
    pub const DEFAULT: Self = Self(0);
    /// Standard run-time type information on every instance
    pub const STANDARD_RTTI: Self = Self(0x0800);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

/// Management namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Cow<'static, str>);

impl Namespace {
    pub const ROOT_CIMV2: Self = Self(Cow::Borrowed("root/CIMv2"));
    pub const ROOT_WMI: Self = Self(Cow::Borrowed("root/WMI"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace names compare without case, with either slash style
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        let normalize = |s: &str| s.replace('\\', "/").to_lowercase();
        normalize(&self.0) == normalize(other)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::ROOT_CIMV2
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cursor step as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct NativeFetch {
    /// `None` for an empty result set
    pub instance: Option<Instance>,
    /// Whether another fetch will yield an instance
    pub more_results: bool,
}

/// Management runtime
pub trait Provider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Bring the runtime up
    ///
    /// # Errors
    /// [`MiError::Unavailable`] when the runtime is missing, or
    /// [`MiError::ProtocolMisuse`] when it is already initialized.
    fn initialize(&self) -> Result<(), MiError>;

    /// Tear the runtime down
    ///
    /// # Errors
    /// Returns an error if the runtime was not initialized.
    fn shutdown(&self) -> Result<(), MiError>;

    /// Open a session. On failure no handle may remain open.
    ///
    /// # Errors
    /// [`MiError::ConnectionFailed`] or [`MiError::Timeout`].
    fn open_session(
        &self,
        options: &DestinationOptions,
    ) -> Result<Box<dyn ProviderSession>, MiError>;
}

/// Live session handle
pub trait ProviderSession: Send {
    /// Lightweight reachability round trip
    ///
    /// # Errors
    /// [`MiError::ConnectionFailed`] when the target does not answer.
    fn test_connection(&mut self) -> Result<(), MiError>;

    /// Start a query. On failure no cursor handle may remain open.
    ///
    /// # Errors
    /// [`MiError::Execution`] for unknown namespaces, classes or properties.
    fn execute(
        &mut self,
        flags: OperationFlags,
        namespace: &Namespace,
        query: &Query,
    ) -> Result<Box<dyn ProviderCursor>, MiError>;

    /// Release the session handle
    ///
    /// # Errors
    /// Returns an error if the provider fails to release the handle.
    fn close(&mut self) -> Result<(), MiError>;
}

/// Live result cursor
pub trait ProviderCursor: Send {
    /// Fetch the next instance (one round trip)
    ///
    /// # Errors
    /// Returns any provider error raised mid-stream.
    fn next(&mut self) -> Result<NativeFetch, MiError>;

    /// Release the cursor, drained or not
    ///
    /// # Errors
    /// Returns an error if the provider fails to release the handle.
    fn close(&mut self) -> Result<(), MiError>;
}
