#![warn(missing_docs)]
//! Streaming ingestion of product analysis feeds.
//!
//! The analysis service answers a query with an open-ended `data:` feed, one product
//! record per frame. This crate reads that feed chunk by chunk, rebuilds frames that
//! were split in transit, and publishes a growing, deduplicated result set after
//! every new product.

pub mod aggregator;
pub mod client;
pub mod controls;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod session;

pub use aggregator::{
    Aggregator, LineOutcome, MalformedPolicy, PipelinePolicy, RecommendationPolicy, StreamStats,
};
pub use client::{AnalysisClient, AnalysisRequest, InputKind, SessionContext};
pub use controls::{Cli, StreamControls};
pub use error::{PayloadError, RequestError, StreamError};
pub use pipeline::{
    consume, CancelHandle, FailureKind, StreamEnd, StreamEvent, StreamObserver, StreamSummary,
};
pub use record::{EnrichedRecord, RawRecord, ResultSet};
pub use session::{ActiveAnalysis, AnalysisSession};
