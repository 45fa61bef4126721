//! Session connection options

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Locale requested for provider-localized strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    #[must_use]
    pub fn english() -> Self {
        Self::new("en-US")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options consumed by session creation
///
/// Unset fields mean provider defaults. A zero timeout is treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationOptions {
    locale: Option<Locale>,
    timeout: Option<Duration>,
}

impl DestinationOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handshake and per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Set the locale
    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    #[must_use]
    pub fn locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
