//! Core domain types and logic.

pub mod candle;
pub mod ast;
pub mod indicator;
pub mod library;
pub mod eval;
pub mod page;
pub mod config;
pub mod error;
