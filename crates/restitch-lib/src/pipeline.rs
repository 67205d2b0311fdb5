use crate::artifact::{
    suppress_flat_and_spikes, suppress_spikes_and_vote, ArtifactConfig, PolarityDecision,
};
use crate::error::ReconstructError;
use crate::filters::{remove_baseline_wander, smooth_signal};
use crate::ingest::ingest_rows;
use crate::registry::ChannelRegistry;
use crate::signal::RecordSet;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// All tunables for the reconstruction pipeline. Every threshold the
/// stages use lives here so a run is fully described by one value;
/// deserializable so threshold files can override any subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base timeline tick in milliseconds.
    pub tick_ms: i64,
    /// Placeholder for "not recorded at this tick".
    pub sentinel: f64,
    /// Gaps shorter than this are reported in seconds, longer in minutes.
    pub small_gap_limit_s: f64,
    pub artifact: ArtifactConfig,
    /// Centre frequency of the baseline-wander notch, Hz.
    pub baseline_cutoff_hz: f64,
    /// Q of the baseline-wander notch; low Q makes the notch wide.
    pub notch_q: f64,
    /// Smoothing window override; derived from the sample rate if unset.
    pub smooth_window: Option<usize>,
    pub smooth_polyorder: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 2,
            sentinel: 0.5,
            small_gap_limit_s: 180.0,
            artifact: ArtifactConfig::default(),
            baseline_cutoff_hz: 0.05,
            notch_q: 0.005,
            smooth_window: None,
            smooth_polyorder: 3,
        }
    }
}

/// A timestamp discontinuity, recovered by synthetic-tick insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapReport {
    /// Timestamp of the last row before the gap.
    pub start: DateTime<FixedOffset>,
    pub duration_s: f64,
}

/// Polarity decision for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionReport {
    pub key: String,
    pub decision: PolarityDecision,
    /// Support for the decision, percent of classified windows.
    pub confidence: f64,
    pub windows: usize,
    pub flipped: bool,
}

/// Per-channel count of sentinel-valued ticks after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelFill {
    pub key: String,
    pub count: usize,
}

/// Data-quality summary accumulated across the pipeline. Nothing in here
/// is fatal; it exists for downstream reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub gaps: Vec<GapReport>,
    pub inversions: Vec<InversionReport>,
    pub sentinel_fills: Vec<SentinelFill>,
    /// Rows with fewer tokens than channels (alignment deficit).
    pub short_rows: usize,
    /// Non-blank tokens that failed numeric parsing.
    pub bad_tokens: usize,
}

/// Reconstructed multi-channel series plus its diagnostics record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconstruction {
    pub record: RecordSet,
    pub diagnostics: Diagnostics,
}

/// Ingestion phase: timeline building, sample alignment and sub-rate
/// interpolation. Returns the raw aligned series, uncorrected.
pub fn reconstruct<I, S>(
    registry: &ChannelRegistry,
    rows: I,
    cfg: &PipelineConfig,
) -> Result<Reconstruction, ReconstructError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (record, diagnostics) = ingest_rows(registry, rows, cfg)?;
    Ok(Reconstruction {
        record,
        diagnostics,
    })
}

/// Correction phase, per channel: coarse flat/spike suppression on the
/// raw series, baseline-wander removal, fine spike suppression with the
/// polarity vote (which sees the pre-smoothing sequence), then
/// polynomial smoothing. Series length and timeline alignment are
/// preserved throughout.
pub fn correct(reconstruction: &mut Reconstruction, cfg: &PipelineConfig) {
    let rate = reconstruction.record.estimated_sample_rate();
    let sentinel = reconstruction.record.sentinel;
    for channel in &mut reconstruction.record.channels {
        suppress_flat_and_spikes(
            &mut channel.data,
            sentinel,
            &cfg.artifact.coarse,
            cfg.artifact.flat_run_min,
        );
        channel.data = remove_baseline_wander(
            &channel.data,
            rate,
            cfg.baseline_cutoff_hz,
            cfg.notch_q,
        );
        let outcome = suppress_spikes_and_vote(
            &mut channel.data,
            &cfg.artifact.fine,
            &cfg.artifact.polarity,
        );
        reconstruction.diagnostics.inversions.push(InversionReport {
            key: channel.key.clone(),
            decision: outcome.decision,
            confidence: outcome.confidence,
            windows: outcome.windows,
            flipped: outcome.flipped,
        });
        channel.data = smooth_signal(&channel.data, rate, cfg.smooth_window, cfg.smooth_polyorder);
        log::info!("channel {} corrected", channel.key);
    }
}

/// Full batch run: ingest, then correct. Either returns a complete
/// series with diagnostics or aborts on a fatal structural error with no
/// partial output.
pub fn run<I, S>(
    registry: &ChannelRegistry,
    rows: I,
    cfg: &PipelineConfig,
) -> Result<Reconstruction, ReconstructError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut reconstruction = reconstruct(registry, rows, cfg)?;
    correct(&mut reconstruction, cfg);
    Ok(reconstruction)
}
