use std::sync::Arc;

use crate::services::{queue::JobQueue, storage::ObjectStore, taxonomy::Taxonomy};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub taxonomy: Arc<Taxonomy>,
    pub storage: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn JobQueue>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        taxonomy: Taxonomy,
        storage: impl ObjectStore + 'static,
        queue: impl JobQueue + 'static,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            taxonomy: Arc::new(taxonomy),
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            max_upload_bytes,
        }
    }
}
