use super::response::AnnounceResponse;
use crate::constants::UDP_CONNECTION_ID_LIFETIME;
use rand::Rng as _;
use std::time::{Duration, Instant};

/// Per-tracker protocol state carried between announces.
#[derive(Debug, Clone, Default)]
pub struct TrackerState {
    transaction_id: u32,
    connection: Option<(u64, Instant)>,
    /// Re-announce interval from the last successful response.
    pub interval: Option<Duration>,
    /// Opaque id some HTTP trackers ask to have echoed back.
    pub tracker_id: Option<String>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws a fresh random transaction id for the next request.
    pub fn next_transaction(&mut self) -> u32 {
        self.transaction_id = rand::rng().random();
        self.transaction_id
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// The cached UDP connection id, if it has not expired at `now`.
    pub fn connection_id(&self, now: Instant) -> Option<u64> {
        self.connection
            .filter(|&(_, expires)| now < expires)
            .map(|(id, _)| id)
    }

    pub fn set_connection_id(&mut self, id: u64, now: Instant) {
        self.connection = Some((id, now + UDP_CONNECTION_ID_LIFETIME));
    }

    pub fn clear_connection_id(&mut self) {
        self.connection = None;
    }

    /// Remembers what the tracker told us for the next announce.
    pub fn record(&mut self, response: &AnnounceResponse) {
        self.interval = Some(Duration::from_secs(response.interval as u64));
        if response.tracker_id.is_some() {
            self.tracker_id = response.tracker_id.clone();
        }
    }
}
