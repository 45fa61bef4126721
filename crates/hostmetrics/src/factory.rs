//! Provider construction from configuration

use std::sync::Arc;

use eyre::{Result, WrapErr};
use hostmetrics_mi::{MemoryProvider, Snapshot};

use crate::config::Config;

/// Build the provider the sessions run against
///
/// # Errors
/// Returns an error if the configured snapshot cannot be loaded.
pub fn create_provider(config: &Config) -> Result<Arc<MemoryProvider>> {
    let snapshot = match &config.provider.snapshot {
        Some(path) => {
            let snapshot = Snapshot::load(path)
                .wrap_err_with(|| format!("failed to load provider snapshot {}", path.display()))?;
            tracing::info!(path = %path.display(), "provider snapshot loaded");
            snapshot
        }
        None => {
            tracing::warn!("no provider snapshot configured, serving an empty provider");
            Snapshot::new()
        }
    };
    Ok(Arc::new(MemoryProvider::new(snapshot)))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_missing_snapshot_file() {
        let mut config = Config::default();
        config.provider.snapshot = Some(PathBuf::from("/nonexistent/hostmetrics/snapshot.json"));
        let err = create_provider(&config).unwrap_err();
        assert!(format!("{err:#}").contains("provider unavailable"));
    }

    #[test]
    fn test_empty_provider_by_default() {
        let provider = create_provider(&Config::default()).unwrap();
        assert_eq!(provider.handle_count(), 0);
    }
}
