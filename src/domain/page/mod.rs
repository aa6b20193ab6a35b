//! Page cache: background-computed, shared, reference-counted slices of
//! candle or indicator data.
//!
//! Lifecycle: `Empty → Loading → Ready`, `Ready → Updating → Ready` on a
//! rebuild, and any state `→ Error` when a computation fails. An errored
//! page is replaced by the next request for its key.

pub mod key;
pub mod listener;
pub mod manager;

pub use key::{PageKey, PageKind, ParamKey, ParamValue, TimeRange};
pub use listener::{Listener, ListenerId, PageEvent, PageListener};
pub use manager::{PageManager, RefreshMode};

use crate::domain::error::PageError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    Empty,
    Loading,
    Ready,
    Updating,
    Error,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageState::Empty => "EMPTY",
            PageState::Loading => "LOADING",
            PageState::Ready => "READY",
            PageState::Updating => "UPDATING",
            PageState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

/// Immutable result snapshot: one timestamp per row, columns aligned to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageData {
    pub timestamps: Vec<DateTime<Utc>>,
    pub columns: Vec<Column>,
}

impl PageData {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// What readers observe: the state and the last published snapshot.
#[derive(Debug, Clone)]
pub(crate) struct PageStatus {
    pub state: PageState,
    pub data: Option<Arc<PageData>>,
    pub error: Option<String>,
    /// Number of state transitions published so far.
    pub revision: u64,
}

impl PageStatus {
    pub(crate) fn empty() -> Self {
        Self {
            state: PageState::Empty,
            data: None,
            error: None,
            revision: 0,
        }
    }
}

/// Unique per page instance, so a replacement page for the same key never
/// receives events meant for the page it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub(crate) u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// Consumer handle to a page. Cheap to clone; reads never block.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    key: Arc<PageKey>,
    status: watch::Receiver<PageStatus>,
}

impl Page {
    pub(crate) fn new(id: PageId, key: Arc<PageKey>, status: watch::Receiver<PageStatus>) -> Self {
        Self { id, key, status }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn key(&self) -> &PageKey {
        &self.key
    }

    pub fn state(&self) -> PageState {
        self.status.borrow().state
    }

    /// State and transition count, read from one snapshot.
    pub(crate) fn revision(&self) -> (PageState, u64) {
        let status = self.status.borrow();
        (status.state, status.revision)
    }

    /// Latest published snapshot. Stays available while `Updating`.
    pub fn data(&self) -> Option<Arc<PageData>> {
        self.status.borrow().data.clone()
    }

    pub fn has_data(&self) -> bool {
        self.status.borrow().data.is_some()
    }

    pub fn error(&self) -> Option<String> {
        self.status.borrow().error.clone()
    }

    /// Waits for `Ready` and returns its snapshot, or the failure message
    /// once the page reaches `Error`.
    pub async fn wait_ready(&self) -> Result<Arc<PageData>, PageError> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(|s| matches!(s.state, PageState::Ready | PageState::Error))
            .await
            .map_err(|_| PageError::Computation {
                message: format!("{} was discarded", self.id),
            })?;
        match (&settled.state, &settled.data) {
            (PageState::Ready, Some(data)) => Ok(Arc::clone(data)),
            _ => Err(PageError::Computation {
                message: settled
                    .error
                    .clone()
                    .unwrap_or_else(|| "page failed".to_string()),
            }),
        }
    }
}
