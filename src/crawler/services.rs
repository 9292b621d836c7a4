//! Collaborators shared by every job of a registry

use crate::advisory::AdvisoryClient;
use crate::capture::CaptureClient;
use crate::events::EventSink;
use crate::recognition::RecognitionClient;
use crate::screenshots::ScreenshotStore;
use crate::storage::SharedStore;
use std::sync::Arc;

pub struct CrawlServices {
    pub capture: Arc<dyn CaptureClient>,
    pub recognition: Arc<dyn RecognitionClient>,
    pub advisory: Arc<dyn AdvisoryClient>,
    pub store: SharedStore,
    pub screenshots: ScreenshotStore,
    pub events: EventSink,
    /// Language hint passed to every recognition call
    pub recognition_language: String,
}
