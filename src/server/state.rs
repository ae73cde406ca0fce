//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::messaging::core::config::TalkConfig;
use crate::messaging::core::errors::TalkResult;
use crate::messaging::service::TalkService;

/// Shared application state.
pub struct AppState {
    /// Talk service backing every route.
    pub service: TalkService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    /// Returns an error if storage cannot be opened or the config is invalid.
    pub async fn new(config: TalkConfig) -> TalkResult<Arc<Self>> {
        let service = TalkService::from_config(config).await?;
        Ok(Arc::new(Self { service }))
    }

    /// Wrap an already built service.
    #[must_use]
    pub fn from_service(service: TalkService) -> Arc<Self> {
        Arc::new(Self { service })
    }
}
