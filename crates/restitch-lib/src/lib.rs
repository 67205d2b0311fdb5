//! Reconstruction of dense, uniformly time-stamped multi-channel
//! physiologic series from sparse header + CSV telemetry exports.
//!
//! The pipeline runs registry construction, timeline building with gap
//! filling, sample alignment, sub-rate interpolation, artifact
//! correction (flat runs, spikes, polarity inversion) and spectral
//! cleanup, and returns the channel-indexed series together with a
//! diagnostics record.

pub mod artifact;
pub mod error;
pub mod filters;
pub mod ingest;
pub mod io;
pub mod pipeline;
pub mod registry;
pub mod signal;

pub use error::ReconstructError;
pub use pipeline::{Diagnostics, PipelineConfig, Reconstruction};
pub use registry::{Channel, ChannelDescriptor, ChannelRegistry};
pub use signal::{ChannelSeries, RecordSet};
