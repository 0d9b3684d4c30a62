use std::sync::Arc;

use crate::monitor::Monitor;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor: Arc::new(monitor),
        }
    }
}
