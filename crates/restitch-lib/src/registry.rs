use crate::error::ReconstructError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One channel record from the recording header, e.g.
/// `{id: 1, label: ECG1, unit: mV, period: 2ms}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub id: String,
    pub label: String,
    pub unit: String,
    /// Nominal sampling period in milliseconds.
    pub period_ms: u32,
}

/// A descriptor bound to its column position and its disambiguated key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Stable column index, assigned at registry construction.
    pub slot: usize,
    /// Output column name; duplicate labels get a `(2)`, `(3)`, ... suffix.
    pub key: String,
    pub descriptor: ChannelDescriptor,
}

/// Ordered, immutable set of channels parsed from header records.
/// Channel order defines column position in the sample rows.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Parse free-form header records into a registry. Each record must
    /// carry `id`, `label`, `unit` and `period`.
    pub fn from_records<I, S>(records: I) -> Result<Self, ReconstructError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut channels = Vec::new();
        let mut label_counts: HashMap<String, usize> = HashMap::new();

        for (index, record) in records.into_iter().enumerate() {
            let descriptor = parse_record(index, record.as_ref())?;
            let seen = label_counts.entry(descriptor.label.clone()).or_insert(0);
            *seen += 1;
            let key = if *seen == 1 {
                descriptor.label.clone()
            } else {
                format!("{}({})", descriptor.label, seen)
            };
            channels.push(Channel {
                slot: index,
                key,
                descriptor,
            });
        }

        Ok(Self { channels })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.key.as_str())
    }

    /// Channels sampled slower than the base tick, as `(slot, stride)`
    /// where `stride = period / tick` in ticks. Channels whose period is
    /// not a clean multiple of the tick are left to the aligner alone.
    pub fn subrate_channels(&self, tick_ms: i64) -> Vec<(usize, usize)> {
        if tick_ms <= 0 {
            return Vec::new();
        }
        self.channels
            .iter()
            .filter(|c| {
                let p = c.descriptor.period_ms as i64;
                p > tick_ms && p % tick_ms == 0
            })
            .map(|c| (c.slot, (c.descriptor.period_ms as i64 / tick_ms) as usize))
            .collect()
    }
}

fn parse_record(index: usize, record: &str) -> Result<ChannelDescriptor, ReconstructError> {
    let body = record.trim().trim_start_matches('{').trim_end_matches('}');
    let mut attrs: HashMap<&str, &str> = HashMap::new();
    for item in body.split(',') {
        if let Some((name, value)) = item.split_once(':') {
            attrs.insert(name.trim(), value.trim());
        }
    }

    let take = |attribute: &'static str| -> Result<String, ReconstructError> {
        attrs
            .get(attribute)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .ok_or(ReconstructError::MalformedHeader { index, attribute })
    };

    let id = take("id")?;
    let label = take("label")?;
    let unit = take("unit")?;
    let period = take("period")?;
    let period_ms = parse_period_ms(&period)
        .ok_or(ReconstructError::MalformedHeader {
            index,
            attribute: "period",
        })?;

    Ok(ChannelDescriptor {
        id,
        label,
        unit,
        period_ms,
    })
}

/// Accepts `2ms`, `1s`, or a bare millisecond count.
fn parse_period_ms(value: &str) -> Option<u32> {
    let v = value.trim();
    if let Some(ms) = v.strip_suffix("ms") {
        return ms.trim().parse().ok();
    }
    if let Some(s) = v.strip_suffix('s') {
        let secs: u32 = s.trim().parse().ok()?;
        return secs.checked_mul(1000);
    }
    v.parse().ok()
}
