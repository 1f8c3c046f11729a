//! Session Backend Assembly
//!
//! [`SessionBackend`] wires a storage client, a [`StoreConfig`] and an
//! [`ElectionGuard`] into a ready-to-use repository, arming the reaper when
//! the configuration enables it and the guard allows it.
//!
//! ## Example
//!
//! ```
//! use kvsession::backend::SessionBackend;
//! use kvsession::config::StoreConfig;
//! use kvsession::reaper::Always;
//! use kvsession::storage::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let config = StoreConfig::new().with_reap_interval(Duration::from_secs(60));
//! let backend = SessionBackend::start(Arc::new(MemoryStore::new()), &config, Arc::new(Always));
//!
//! assert!(backend.is_reaping());
//! # });
//! ```

use crate::config::StoreConfig;
use crate::reaper::{ElectionGuard, Reaper, ReaperHandle};
use crate::session::SessionRepository;
use crate::storage::StorageClient;
use std::sync::Arc;
use tracing::info;

/// A session repository plus its (optional) running reaper.
///
/// Dropping the backend stops the reaper.
#[derive(Debug)]
pub struct SessionBackend {
    repository: SessionRepository,
    reaper: Reaper,
    handle: Option<ReaperHandle>,
}

impl SessionBackend {
    /// Builds the repository and arms the reaper if configured and eligible.
    ///
    /// Must be called inside a Tokio runtime when reaping is enabled.
    pub fn start(
        client: Arc<dyn StorageClient>,
        config: &StoreConfig,
        guard: Arc<dyn ElectionGuard>,
    ) -> Self {
        let repository = SessionRepository::from_config(client, config);
        let reaper = Reaper::for_repository(&repository, guard);

        let handle = match config.reap_interval() {
            Some(period) => reaper.clone().start(period),
            None => {
                info!(bucket = %config.bucket, "Session reaping disabled");
                None
            }
        };

        Self {
            repository,
            reaper,
            handle,
        }
    }

    /// The repository the session middleware should use.
    pub fn repository(&self) -> &SessionRepository {
        &self.repository
    }

    /// The reaper, for on-demand sweeps.
    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// The running reaper task, if one was armed.
    pub fn reaper_handle(&self) -> Option<&ReaperHandle> {
        self.handle.as_ref()
    }

    pub fn is_reaping(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the reaper task, leaving the repository usable.
    pub fn stop_reaping(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}
