//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod library_page_source;
pub mod memory_series_adapter;
