//! Computation port run by page workers.

use crate::domain::error::PageError;
use crate::domain::page::{PageData, PageKey};

/// Produces the data of one page. Runs on the blocking pool; it may take
/// as long as it needs but must not touch consumer state.
pub trait PageSource: Send + Sync {
    fn compute(&self, key: &PageKey) -> Result<PageData, PageError>;
}
