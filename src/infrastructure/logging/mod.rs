//! Logging infrastructure
//!
//! Structured diagnostics through tracing and tracing-subscriber, written to
//! stderr and optionally to rolling JSON files.

pub mod logger;

pub use logger::LoggerImpl;
