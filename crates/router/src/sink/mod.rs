//! Sink trait: abstract interface for the downstream search backend.
//!
//! The connection handler writes every record through this trait.
//! `elastic.rs` provides the real HTTP implementation.
//! `memory.rs` provides a test double.

pub mod elastic;
pub mod memory;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::route::RoutedRecord;

pub use elastic::ElasticSink;
pub use memory::MemorySink;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink client setup failed: {0}")]
    Setup(String),
    #[error("Sink request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Sink rejected write to {index}: HTTP {status}: {body}")]
    Rejected {
        index: String,
        status: u16,
        body: String,
    },
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
    #[error("{source} (gave up after {retries} retries)")]
    Exhausted {
        retries: u32,
        #[source]
        source: Box<SinkError>,
    },
}

impl SinkError {
    /// Transport failures, throttling and server-side errors may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transport(_) | SinkError::Unavailable(_) => true,
            SinkError::Rejected { status, .. } => *status == 429 || *status >= 500,
            SinkError::Setup(_) | SinkError::Exhausted { .. } => false,
        }
    }

    /// Failed attempts that were retried before this error was returned.
    pub fn retries(&self) -> u32 {
        match self {
            SinkError::Exhausted { retries, .. } => *retries,
            _ => 0,
        }
    }
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Index the record was written to
    pub index: String,
    /// Failed attempts before the one that succeeded
    pub retries: u32,
}

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<Delivery, SinkError>> + Send + 'a>>;

/// Unified async interface over the search backend.
///
/// Object-safe thanks to the boxed future, so it can live inside
/// `Arc<RouterState>` as `Arc<dyn RecordSink>`.
pub trait RecordSink: Send + Sync {
    /// Write one record to its destination index, or the default index
    /// when it carries no override.
    fn write<'a>(&'a self, routed: &'a RoutedRecord) -> SinkFuture<'a>;

    /// Short backend name for logs and the monitor API.
    fn name(&self) -> &'static str;

    /// Where records go, without credentials.
    fn destination(&self) -> String;
}
