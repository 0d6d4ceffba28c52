use crate::event::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Idle,
    Loading,
}

/// Offset cursor for "load older" requests.
///
/// The offset advances when a request is issued, not when its page arrives,
/// so a second request can never reuse an offset that is still in flight.
#[derive(Debug, Clone)]
pub struct Pager {
    offset: u64,
    limit: u64,
    state: PageState,
    exhausted: bool,
}

impl Pager {
    pub fn new(limit: u64) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
            state: PageState::Idle,
            exhausted: false,
        }
    }

    /// Returns the next page to fetch, or `None` while a page is in flight or
    /// once the server reported there is nothing older.
    pub fn request_older(&mut self) -> Option<PageRequest> {
        if self.state == PageState::Loading {
            tracing::debug!(offset = self.offset, "older page already loading");
            return None;
        }
        if self.exhausted {
            return None;
        }
        let request = PageRequest {
            offset: self.offset,
            limit: self.limit,
        };
        self.offset += self.limit;
        self.state = PageState::Loading;
        Some(request)
    }

    /// Settles the in-flight request. Pages that arrive while idle (late
    /// responses) are still accepted.
    pub fn on_page(&mut self, has_more: bool) {
        self.state = PageState::Idle;
        if !has_more && !self.exhausted {
            tracing::info!(offset = self.offset, "no older pages left");
            self.exhausted = true;
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == PageState::Loading
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
