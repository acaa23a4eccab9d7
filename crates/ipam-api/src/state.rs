use ipam_engine::SpaceService;
use std::sync::Arc;

/// Shared application state. No event bus / watch channel (§B: WATCH is not
/// part of this spec's surface, unlike the teacher's k8s-shaped API).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SpaceService>,
}

impl AppState {
    pub fn new(service: Arc<SpaceService>) -> Self {
        Self { service }
    }
}
