//! # Utility Modules
//!
//! Supporting pieces shared by the codec.
//!
//! ## Components
//! - **Buffer Pool**: reusable output buffers for packing archives
//! - **Logging**: `tracing-subscriber` setup
//! - **Metrics**: atomic archive counters

pub mod buffer_pool;
pub mod logging;
pub mod metrics;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use metrics::{global_metrics, ArchiveMetrics, MetricsSnapshot};
