/// Choke and interest flags for both directions of one connection.
///
/// Both sides start out choking and uninterested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokingState {
    /// We are choking the remote: its requests will not be served.
    pub am_choking: bool,
    /// We want data from the remote.
    pub am_interested: bool,
    /// The remote is choking us: we must not send requests.
    pub peer_choking: bool,
    /// The remote wants data from us.
    pub peer_interested: bool,
}

impl Default for ChokingState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

impl ChokingState {
    /// True when requests may be sent to the remote.
    pub fn can_request(&self) -> bool {
        !self.peer_choking
    }
}

/// Upload slot accounting.
///
/// Interested peers are unchoked first come, first served until every slot
/// is taken; a slot frees up when its peer loses interest or disconnects.
#[derive(Debug, Clone)]
pub struct UploadSlots<K> {
    capacity: usize,
    holders: Vec<K>,
}

impl<K: Copy + Eq> UploadSlots<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            holders: Vec::with_capacity(capacity),
        }
    }

    /// Tries to give `peer` a slot. Returns true if it now holds one.
    pub fn acquire(&mut self, peer: K) -> bool {
        if self.holders.contains(&peer) {
            return true;
        }
        if self.holders.len() >= self.capacity {
            return false;
        }
        self.holders.push(peer);
        true
    }

    /// Returns true if `peer` held a slot.
    pub fn release(&mut self, peer: K) -> bool {
        let before = self.holders.len();
        self.holders.retain(|&p| p != peer);
        self.holders.len() != before
    }

    pub fn in_use(&self) -> usize {
        self.holders.len()
    }
}
