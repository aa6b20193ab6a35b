//! Port traits for external collaborators.

pub mod config_port;
pub mod page_source;
pub mod series_port;
