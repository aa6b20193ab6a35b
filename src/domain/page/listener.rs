//! Listener side of the page cache.
//!
//! Page actors push events into a listener's channel from worker threads.
//! The consumer drains them on its own thread with `dispatch`, so callbacks
//! never run on a worker. Events for pages the listener has fully released
//! are dropped at dispatch.

use super::{PageId, PageState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    StateChanged {
        page: PageId,
        old: PageState,
        new: PageState,
    },
    /// `Ready` data was replaced without a state transition.
    DataChanged { page: PageId },
}

impl PageEvent {
    pub fn page(&self) -> PageId {
        match self {
            PageEvent::StateChanged { page, .. } | PageEvent::DataChanged { page } => *page,
        }
    }
}

/// Callbacks invoked by `Listener::dispatch` on the consumer's thread.
pub trait PageListener {
    fn on_state_changed(&mut self, page: PageId, old: PageState, new: PageState);

    fn on_data_changed(&mut self, _page: PageId) {}
}

pub struct Listener {
    id: ListenerId,
    sender: mpsc::UnboundedSender<PageEvent>,
    events: mpsc::UnboundedReceiver<PageEvent>,
    /// Outstanding requests per page.
    attached: HashMap<PageId, usize>,
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener {
    pub fn new() -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        Self {
            id: ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed)),
            sender,
            events,
            attached: HashMap::new(),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_attached(&self, page: PageId) -> bool {
        self.attached.contains_key(&page)
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<PageEvent> {
        self.sender.clone()
    }

    pub(crate) fn attach(&mut self, page: PageId) {
        *self.attached.entry(page).or_insert(0) += 1;
    }

    /// Returns false when the listener held no request on `page`.
    pub(crate) fn detach(&mut self, page: PageId) -> bool {
        match self.attached.get_mut(&page) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.attached.remove(&page);
                true
            }
            None => false,
        }
    }

    /// Delivers every pending event to `handler`; returns how many were
    /// delivered.
    pub fn dispatch(&mut self, handler: &mut dyn PageListener) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.events.try_recv() {
            if !self.is_attached(event.page()) {
                continue;
            }
            match event {
                PageEvent::StateChanged { page, old, new } => handler.on_state_changed(page, old, new),
                PageEvent::DataChanged { page } => handler.on_data_changed(page),
            }
            delivered += 1;
        }
        delivered
    }

    /// Waits for the next event on a still-attached page.
    pub async fn next_event(&mut self) -> Option<PageEvent> {
        loop {
            let event = self.events.recv().await?;
            if self.is_attached(event.page()) {
                return Some(event);
            }
        }
    }

    /// Drains pending events without waiting.
    pub fn drain(&mut self) -> Vec<PageEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if self.is_attached(event.page()) {
                out.push(event);
            }
        }
        out
    }
}
