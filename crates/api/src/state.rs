//! Shared handler state.

use std::sync::Arc;

use event_store::EventStore;
use feed::{FeedCache, FeedUrls, ReadResultAdapter};
use projections::ProjectionCoordinator;

use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub coordinator: Arc<ProjectionCoordinator>,
    pub adapter: ReadResultAdapter,
    pub cache: FeedCache,
    /// Entries on head pages and on `GET /all`.
    pub page_size: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        coordinator: Arc<ProjectionCoordinator>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            coordinator,
            adapter: ReadResultAdapter::new(FeedUrls::new(config.public_base_url.as_str())),
            cache: FeedCache::default(),
            page_size: config.feed_page_size,
        }
    }
}
