//! Storage module - downloadable exports

pub mod export;

pub use export::{ExportFormat, ExportStore};
