use crate::registry::ChannelRegistry;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Flexible parse format for absolute row timestamps,
/// e.g. `2021-01-01 00:00:00.000 +0000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Fixed-width render format used when writing series back out.
pub const TIMESTAMP_OUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";

/// One channel's reconstructed samples, index-aligned with the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSeries {
    /// Disambiguated channel label.
    pub key: String,
    /// Column position from the registry.
    pub slot: usize,
    pub data: Vec<f64>,
}

/// The dense, uniformly time-stamped multi-channel matrix: one timestamp
/// per base tick plus one equal-length series per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSet {
    pub times: Vec<DateTime<FixedOffset>>,
    pub channels: Vec<ChannelSeries>,
    /// Reserved placeholder meaning "not recorded at this tick".
    pub sentinel: f64,
}

impl RecordSet {
    pub fn new(registry: &ChannelRegistry, sentinel: f64) -> Self {
        let channels = registry
            .channels()
            .iter()
            .map(|c| ChannelSeries {
                key: c.key.clone(),
                slot: c.slot,
                data: Vec::new(),
            })
            .collect();
        Self {
            times: Vec::new(),
            channels,
            sentinel,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// True when every channel series is 1:1 aligned with the timeline.
    pub fn is_aligned(&self) -> bool {
        self.channels.iter().all(|c| c.data.len() == self.times.len())
    }

    pub fn series(&self, key: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.data.as_slice())
    }

    /// Effective sample rate in Hz derived from the reconstructed
    /// timeline span, rounded to 3 decimals. Zero when undefined.
    pub fn estimated_sample_rate(&self) -> f64 {
        if self.times.len() < 2 {
            return 0.0;
        }
        let first = self.times[0];
        let last = self.times[self.times.len() - 1];
        let elapsed = (last - first).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return 0.0;
        }
        let rate = self.times.len() as f64 / elapsed;
        (rate * 1000.0).round() / 1000.0
    }
}
