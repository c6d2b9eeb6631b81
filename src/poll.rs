// MIT License - Copyright (c) 2026 Peter Wright

use tracing::{debug, warn};

use crate::error::Result;
use crate::session::PanelSession;
use crate::status::Status;

/// Consecutive retryable poll failures tolerated before the poller stops
/// serving stale data. Observed panels drop a poll now and then; more than
/// two in a row means it is actually gone.
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 2;

/// Periodic status polling with the stale-data policy.
///
/// A timeout keeps the last known-good snapshot on the wire so one slow
/// poll does not flap every entity; once failures pile up past the cutover
/// the poller switches to the blank status so entities become visibly
/// unavailable instead of silently stale. Any success resets the counter.
/// All other errors propagate untouched.
pub struct StatusPoller {
    session: PanelSession,
    last: Status,
    failures: u32,
    max_failures: u32,
}

impl StatusPoller {
    pub fn new(session: PanelSession, max_failures: u32) -> Self {
        Self {
            session,
            last: Status::default(),
            failures: 0,
            max_failures,
        }
    }

    /// Access the underlying session, e.g. to send commands between polls.
    pub fn session_mut(&mut self) -> &mut PanelSession {
        &mut self.session
    }

    pub fn session(&self) -> &PanelSession {
        &self.session
    }

    /// Current run of consecutive retryable failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Whether the last poll outcome should be treated as live data.
    pub fn is_available(&self) -> bool {
        self.failures <= self.max_failures
    }

    pub async fn poll(&mut self) -> Result<Status> {
        match self.session.get_status().await {
            Ok(status) => {
                self.failures = 0;
                self.last = status.clone();
                Ok(status)
            }
            Err(e) if e.is_retryable() => {
                self.failures += 1;
                if self.failures > self.max_failures {
                    warn!(
                        "{} consecutive poll timeouts, reporting the panel unavailable",
                        self.failures
                    );
                    Ok(Status::default())
                } else {
                    debug!(
                        "poll timed out ({}/{}), keeping last status: {e}",
                        self.failures, self.max_failures
                    );
                    Ok(self.last.clone())
                }
            }
            Err(e) => Err(e),
        }
    }
}
