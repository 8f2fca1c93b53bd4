use std::sync::Arc;

use crate::editor::EditorService;
use crate::tracking::TrackingService;

#[derive(Clone)]
pub struct AppState {
    pub editor: Arc<EditorService>,
    pub tracking: Arc<TrackingService>,
}
