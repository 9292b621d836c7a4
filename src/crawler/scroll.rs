//! Scroll-to-completion detection
//!
//! Pages that load content while scrolling are scrolled until their height
//! stops growing. The loop is bounded by a scroll count and by a timeout on
//! the whole phase, and always leaves the page scrolled back to the top so
//! the screenshot starts at the first pixel.

use crate::capture::{CaptureError, CaptureSession};
use crate::config::JobOptions;
use std::fmt;
use std::time::Duration;

/// Bounds of one scroll phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSettings {
    pub max_scrolls: u32,
    pub timeout: Duration,
    /// Wait after each scroll before measuring again
    pub settle: Duration,
}

impl From<&JobOptions> for ScrollSettings {
    fn from(options: &JobOptions) -> Self {
        Self {
            max_scrolls: options.max_scrolls,
            timeout: options.scroll_timeout(),
            settle: options.scroll_settle(),
        }
    }
}

/// Why the scroll phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// Two consecutive measurements were equal
    Stabilized,
    MaxScrolls,
    TimedOut,
}

impl fmt::Display for ScrollStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stabilized => "stabilized",
            Self::MaxScrolls => "max scrolls reached",
            Self::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub scrolls: u32,
    /// Last measured content extent in pixels
    pub final_extent: u64,
    pub stop: ScrollStop,
}

#[derive(Default)]
struct Progress {
    scrolls: u32,
    extent: u64,
}

/// Scrolls until the page stops growing, then back to the top
pub async fn scroll_to_completion(
    session: &mut dyn CaptureSession,
    settings: &ScrollSettings,
) -> Result<ScrollOutcome, CaptureError> {
    let mut progress = Progress::default();

    let result = tokio::time::timeout(
        settings.timeout,
        scroll_until_stable(&mut *session, settings, &mut progress),
    )
    .await;

    let reset = session.scroll_to_top().await;

    let stop = match result {
        Ok(Ok(stop)) => stop,
        Ok(Err(e)) => return Err(e),
        Err(_) => ScrollStop::TimedOut,
    };
    if let Err(e) = reset {
        tracing::warn!("Failed to scroll back to top: {}", e);
    }

    Ok(ScrollOutcome {
        scrolls: progress.scrolls,
        final_extent: progress.extent,
        stop,
    })
}

async fn scroll_until_stable(
    session: &mut dyn CaptureSession,
    settings: &ScrollSettings,
    progress: &mut Progress,
) -> Result<ScrollStop, CaptureError> {
    progress.extent = session.content_extent().await?;

    loop {
        if progress.scrolls >= settings.max_scrolls {
            return Ok(ScrollStop::MaxScrolls);
        }

        session.scroll_to_bottom().await?;
        progress.scrolls += 1;
        tokio::time::sleep(settings.settle).await;

        let extent = session.content_extent().await?;
        if extent == progress.extent {
            return Ok(ScrollStop::Stabilized);
        }
        progress.extent = extent;
    }
}
