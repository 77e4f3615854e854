use super::error::TrackerError;
use super::http::HttpTracker;
use super::response::{AnnounceRequest, AnnounceResponse};
use super::udp::UdpTracker;
use crate::constants::UDP_TRACKER_TIMEOUT;
use std::time::Duration;

enum Endpoint {
    /// Resolved lazily; dropped again after a failure so the next announce
    /// starts from a fresh socket.
    Udp(Option<UdpTracker>),
    Http(HttpTracker),
}

struct Entry {
    url: String,
    endpoint: Endpoint,
}

/// Announces to a list of tracker URLs with fallback.
///
/// URLs are tried in the order given (a descriptor's `announce` first, then
/// its `announce-list`) and the first successful response wins.
pub struct TrackerClient {
    entries: Vec<Entry>,
    udp_timeout: Duration,
}

impl TrackerClient {
    /// Builds a client over `urls`. Unsupported schemes are logged and
    /// skipped.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = Vec::new();
        for url in urls {
            let url = url.into();
            let endpoint = if url.starts_with("udp://") {
                Endpoint::Udp(None)
            } else {
                match HttpTracker::new(&url) {
                    Ok(tracker) => Endpoint::Http(tracker),
                    Err(e) => {
                        tracing::warn!(tracker = %url, error = %e, "skipping tracker");
                        continue;
                    }
                }
            };
            entries.push(Entry { url, endpoint });
        }

        Self {
            entries,
            udp_timeout: UDP_TRACKER_TIMEOUT,
        }
    }

    /// Overrides the UDP per-attempt read deadline.
    pub fn with_udp_timeout(mut self, timeout: Duration) -> Self {
        self.udp_timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.url.as_str())
    }

    /// Announces to each tracker in turn until one answers. Returns the last
    /// error when all of them fail.
    pub async fn announce_any(
        &mut self,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse, TrackerError> {
        let mut last_error = TrackerError::NoTrackers;

        for entry in &mut self.entries {
            let result = match &mut entry.endpoint {
                Endpoint::Http(tracker) => tracker.announce(request).await,
                Endpoint::Udp(slot) => announce_udp(&entry.url, slot, self.udp_timeout, request).await,
            };

            match result {
                Ok(response) => {
                    tracing::debug!(
                        tracker = %entry.url,
                        event = request.event.as_str(),
                        peers = response.peers.len(),
                        interval = response.interval,
                        "announce succeeded"
                    );
                    if let Some(warning) = &response.warning_message {
                        tracing::warn!(tracker = %entry.url, warning, "tracker warning");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(
                        tracker = %entry.url,
                        error = %e,
                        retryable = e.is_retryable(),
                        "announce failed"
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

async fn announce_udp(
    url: &str,
    slot: &mut Option<UdpTracker>,
    timeout: Duration,
    request: &AnnounceRequest,
) -> Result<AnnounceResponse, TrackerError> {
    let mut tracker = match slot.take() {
        Some(tracker) => tracker,
        None => UdpTracker::connect(url).await?.with_timeout(timeout),
    };

    let result = tracker.announce(request).await;
    if result.is_ok() {
        *slot = Some(tracker);
    }
    result
}
