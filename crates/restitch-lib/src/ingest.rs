use crate::error::ReconstructError;
use crate::pipeline::{Diagnostics, GapReport, PipelineConfig, SentinelFill};
use crate::registry::ChannelRegistry;
use crate::signal::{RecordSet, TIMESTAMP_FORMAT, TIMESTAMP_OUT_FORMAT};
use chrono::{DateTime, Duration, FixedOffset};

/// Sequential row ingestor. Owns the growing timeline and channel series;
/// rows must be fed in file order because implicit timestamps and the
/// sub-rate interpolator depend on the running state. Every `push_row`
/// leaves all series 1:1 aligned with the timeline.
pub struct Ingestor<'a> {
    registry: &'a ChannelRegistry,
    cfg: &'a PipelineConfig,
    tick: Duration,
    record: RecordSet,
    diagnostics: Diagnostics,
    last_time: Option<DateTime<FixedOffset>>,
    /// Token count of the first row; fixes the leading column region.
    num_cols_start: Option<usize>,
    /// `(slot, stride)` for channels sampled slower than the base tick.
    subrate: Vec<(usize, usize)>,
    row_index: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(registry: &'a ChannelRegistry, cfg: &'a PipelineConfig) -> Self {
        Self {
            registry,
            cfg,
            tick: Duration::milliseconds(cfg.tick_ms),
            record: RecordSet::new(registry, cfg.sentinel),
            diagnostics: Diagnostics::default(),
            last_time: None,
            num_cols_start: None,
            subrate: registry.subrate_channels(cfg.tick_ms),
            row_index: 0,
        }
    }

    pub fn record(&self) -> &RecordSet {
        &self.record
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Ingest one raw row: resolve its timestamp (filling any gap with
    /// sentinel ticks), align its tokens onto channel slots, and run the
    /// incremental sub-rate interpolation.
    pub fn push_row(&mut self, line: &str) -> Result<(), ReconstructError> {
        let tokens: Vec<&str> = line.trim_end().split(',').map(str::trim).collect();
        let row = self.row_index;
        self.row_index += 1;

        let num_nodes = self.registry.len();
        let num_cols_start = *self.num_cols_start.get_or_insert_with(|| {
            let missing = (num_nodes + 1).saturating_sub(tokens.len());
            if missing == 0 {
                log::info!("no missing columns found, file pre-aligned");
            } else {
                log::info!("{missing} missing columns found, file not pre-aligned");
            }
            tokens.len()
        });

        let time = self.resolve_timestamp(row, tokens[0])?;
        self.last_time = Some(time);
        self.record.times.push(time);

        // Sample alignment: the leading column region always parses
        // positionally; a short row sentinel-fills every trailing channel.
        let short_row = tokens.len() < num_nodes + 1;
        if short_row {
            self.diagnostics.short_rows += 1;
        }
        for slot in 0..num_nodes {
            let col = slot + 1;
            let value = if col >= num_cols_start && short_row {
                self.record.sentinel
            } else {
                self.parse_token(row, tokens.get(col).copied())
            };
            self.record.channels[slot].data.push(value);
        }

        self.interpolate_subrate();
        Ok(())
    }

    /// Consume the ingestor, closing out diagnostics. Sentinel-fill counts
    /// reflect the series as ingested, before artifact correction.
    pub fn finish(mut self) -> (RecordSet, Diagnostics) {
        let sentinel = self.record.sentinel;
        self.diagnostics.sentinel_fills = self
            .record
            .channels
            .iter()
            .map(|c| SentinelFill {
                key: c.key.clone(),
                count: c.data.iter().filter(|v| **v == sentinel).count(),
            })
            .collect();
        (self.record, self.diagnostics)
    }

    fn resolve_timestamp(
        &mut self,
        row: usize,
        first_token: &str,
    ) -> Result<DateTime<FixedOffset>, ReconstructError> {
        if first_token.is_empty() {
            // Implicit row: one tick after the previous row, by definition
            // contiguous, so no gap check.
            let last = self.last_time.ok_or(ReconstructError::TimelineInit)?;
            return Ok(last + self.tick);
        }

        let time = DateTime::parse_from_str(first_token, TIMESTAMP_FORMAT).map_err(|source| {
            ReconstructError::BadTimestamp {
                row,
                token: first_token.to_string(),
                source,
            }
        })?;
        if let Some(last) = self.last_time {
            if time != last + self.tick {
                self.fill_gap(last, time);
            }
        }
        Ok(time)
    }

    /// Synthesize sentinel-valued ticks from the last seen timestamp up to
    /// (but never overshooting or duplicating) the explicit timestamp that
    /// revealed the gap.
    fn fill_gap(&mut self, last: DateTime<FixedOffset>, time: DateTime<FixedOffset>) {
        let duration_s = (time - last).num_milliseconds() as f64 / 1000.0;
        if duration_s < self.cfg.small_gap_limit_s {
            log::warn!(
                "{duration_s:.3} second gap starting at {}",
                last.format(TIMESTAMP_OUT_FORMAT)
            );
        } else {
            log::warn!(
                "{:.3} minute gap starting at {}",
                duration_s / 60.0,
                last.format(TIMESTAMP_OUT_FORMAT)
            );
        }
        self.diagnostics.gaps.push(GapReport {
            start: last,
            duration_s,
        });

        while time != *self.record.times.last().expect("timeline anchored") + self.tick {
            let synth = *self.record.times.last().expect("timeline anchored") + self.tick;
            self.record.times.push(synth);
            let sentinel = self.record.sentinel;
            for channel in &mut self.record.channels {
                channel.data.push(sentinel);
            }
            if time - self.tick <= synth {
                break;
            }
        }
    }

    fn parse_token(&mut self, row: usize, token: Option<&str>) -> f64 {
        match token {
            None | Some("") => self.record.sentinel,
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    log::debug!("row {row}: unparseable sample token `{raw}`");
                    self.diagnostics.bad_tokens += 1;
                    self.record.sentinel
                }
            },
        }
    }

    /// For each sub-rate channel, once the newest tick holds a real value,
    /// the preceding `stride - 1` ticks are all sentinel, and the tick
    /// before that run holds a real value, replace the run with a linear
    /// fill between the two known samples.
    fn interpolate_subrate(&mut self) {
        let sentinel = self.record.sentinel;
        for &(slot, stride) in &self.subrate {
            let data = &mut self.record.channels[slot].data;
            let n = data.len();
            if stride < 2 || n < stride + 1 {
                continue;
            }
            let run = stride - 1;
            let end = data[n - 1];
            if end == sentinel {
                continue;
            }
            let start = data[n - 1 - stride];
            if start == sentinel {
                continue;
            }
            if data[n - 1 - run..n - 1].iter().any(|v| *v != sentinel) {
                continue;
            }
            let step = (start - end) / (run as f64 + 1.0);
            for i in 1..=run {
                data[n - 1 - i] = end + i as f64 * step;
            }
        }
    }
}

/// Run the full ingestion phase over an ordered row source.
pub fn ingest_rows<I, S>(
    registry: &ChannelRegistry,
    rows: I,
    cfg: &PipelineConfig,
) -> Result<(RecordSet, Diagnostics), ReconstructError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ingestor = Ingestor::new(registry, cfg);
    for line in rows {
        ingestor.push_row(line.as_ref())?;
    }
    Ok(ingestor.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;

    fn registry(records: &[&str]) -> ChannelRegistry {
        ChannelRegistry::from_records(records.iter().copied()).expect("valid header")
    }

    fn one_channel() -> ChannelRegistry {
        registry(&["{id: 1, label: ECG1, unit: mV, period: 2ms}"])
    }

    #[test]
    fn explicit_then_implicit_rows_build_contiguous_timeline() {
        let reg = one_channel();
        let cfg = PipelineConfig::default();
        let (rec, diag) = ingest_rows(
            &reg,
            ["2021-01-01 00:00:00.000 +0000, 1.0", ", 0.0"],
            &cfg,
        )
        .expect("well-formed rows");

        assert_eq!(rec.len(), 2);
        assert!(rec.is_aligned());
        assert_eq!((rec.times[1] - rec.times[0]).num_milliseconds(), 2);
        assert_eq!(rec.series("ECG1").unwrap(), &[1.0, 0.0]);
        assert!(diag.gaps.is_empty());
    }

    #[test]
    fn first_row_must_carry_timestamp() {
        let reg = one_channel();
        let cfg = PipelineConfig::default();
        let err = ingest_rows(&reg, [", 1.0"], &cfg).expect_err("implicit first row");
        assert!(matches!(err, ReconstructError::TimelineInit));
    }

    #[test]
    fn unparseable_timestamp_is_fatal() {
        let reg = one_channel();
        let cfg = PipelineConfig::default();
        let err = ingest_rows(&reg, ["yesterday about noon, 1.0"], &cfg)
            .expect_err("bad timestamp");
        assert!(matches!(err, ReconstructError::BadTimestamp { row: 0, .. }));
    }

    #[test]
    fn four_ms_jump_yields_one_gap_and_one_synthetic_tick() {
        let reg = one_channel();
        let cfg = PipelineConfig::default();
        let (rec, diag) = ingest_rows(
            &reg,
            [
                "2021-01-01 00:00:00.000 +0000, 1.0",
                "2021-01-01 00:00:00.004 +0000, 1.0",
            ],
            &cfg,
        )
        .expect("well-formed rows");

        assert_eq!(diag.gaps.len(), 1);
        assert!((diag.gaps[0].duration_s - 0.004).abs() < 1e-9);
        assert_eq!(rec.len(), 3);
        let series = rec.series("ECG1").unwrap();
        assert_eq!(series, &[1.0, 0.5, 1.0]);
        // Constant tick spacing survives gap-filling.
        for pair in rec.times.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_milliseconds(), 2);
        }
    }

    #[test]
    fn six_ms_jump_yields_two_synthetic_ticks() {
        let reg = one_channel();
        let cfg = PipelineConfig::default();
        let (rec, diag) = ingest_rows(
            &reg,
            [
                "2021-01-01 00:00:00.000 +0000, 1.0",
                "2021-01-01 00:00:00.006 +0000, 2.0",
            ],
            &cfg,
        )
        .expect("well-formed rows");
        assert_eq!(diag.gaps.len(), 1);
        assert_eq!(rec.len(), 4);
        assert_eq!(rec.series("ECG1").unwrap(), &[1.0, 0.5, 0.5, 2.0]);
    }

    #[test]
    fn short_rows_sentinel_fill_trailing_channels() {
        let reg = registry(&[
            "{id: 1, label: A, unit: mV, period: 2ms}",
            "{id: 2, label: B, unit: mV, period: 2ms}",
            "{id: 3, label: C, unit: mV, period: 2ms}",
        ]);
        let cfg = PipelineConfig::default();
        // First row has only the timestamp and two values: not pre-aligned.
        let (rec, diag) = ingest_rows(
            &reg,
            [
                "2021-01-01 00:00:00.000 +0000, 1.0, 2.0",
                ", 3.0, 4.0, 5.0",
                ", 6.0",
            ],
            &cfg,
        )
        .expect("well-formed rows");

        assert!(rec.is_aligned());
        assert_eq!(rec.series("A").unwrap(), &[1.0, 3.0, 6.0]);
        assert_eq!(rec.series("B").unwrap(), &[2.0, 4.0, 0.5]);
        assert_eq!(rec.series("C").unwrap(), &[0.5, 5.0, 0.5]);
        assert_eq!(diag.short_rows, 2);
    }

    #[test]
    fn blank_and_garbage_tokens_recover_to_sentinel() {
        let reg = registry(&[
            "{id: 1, label: A, unit: mV, period: 2ms}",
            "{id: 2, label: B, unit: mV, period: 2ms}",
        ]);
        let cfg = PipelineConfig::default();
        let (rec, diag) = ingest_rows(
            &reg,
            ["2021-01-01 00:00:00.000 +0000, , oops"],
            &cfg,
        )
        .expect("recoverable tokens");
        assert_eq!(rec.series("A").unwrap(), &[0.5]);
        assert_eq!(rec.series("B").unwrap(), &[0.5]);
        assert_eq!(diag.bad_tokens, 1);
        assert_eq!(diag.sentinel_fills.len(), 2);
        assert_eq!(diag.sentinel_fills[0].count, 1);
    }

    #[test]
    fn ingestion_is_idempotent_over_the_same_rows() {
        let reg = one_channel();
        let cfg = PipelineConfig::default();
        let rows = [
            "2021-01-01 00:00:00.000 +0000, 1.0",
            ", 0.25",
            "2021-01-01 00:00:00.010 +0000, 0.75",
        ];
        let (a, _) = ingest_rows(&reg, rows, &cfg).expect("first run");
        let (b, _) = ingest_rows(&reg, rows, &cfg).expect("second run");
        assert_eq!(a.times, b.times);
        assert_eq!(a.series("ECG1"), b.series("ECG1"));
    }

    #[test]
    fn stride_two_interpolation_yields_midpoint() {
        let reg = registry(&[
            "{id: 1, label: A, unit: mV, period: 2ms}",
            "{id: 2, label: SLOW, unit: mV, period: 4ms}",
        ]);
        let cfg = PipelineConfig::default();
        let (rec, _) = ingest_rows(
            &reg,
            [
                "2021-01-01 00:00:00.000 +0000, 0.1, 1.0",
                ", 0.2,",
                ", 0.3, 3.0",
            ],
            &cfg,
        )
        .expect("well-formed rows");
        assert_eq!(rec.series("SLOW").unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn stride_four_interpolation_fills_three_step_ramp() {
        let reg = registry(&[
            "{id: 1, label: A, unit: mV, period: 2ms}",
            "{id: 2, label: SLOW, unit: mV, period: 8ms}",
        ]);
        let cfg = PipelineConfig::default();
        let (rec, _) = ingest_rows(
            &reg,
            [
                "2021-01-01 00:00:00.000 +0000, 0.0, 0.0",
                ", 0.0,",
                ", 0.0,",
                ", 0.0,",
                ", 0.0, 4.0",
            ],
            &cfg,
        )
        .expect("well-formed rows");
        assert_eq!(rec.series("SLOW").unwrap(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn subrate_run_with_missing_boundary_is_left_alone() {
        let reg = registry(&["{id: 1, label: SLOW, unit: mV, period: 4ms}"]);
        let cfg = PipelineConfig::default();
        // No real value before the sentinel run: nothing to interpolate from.
        let (rec, _) = ingest_rows(
            &reg,
            ["2021-01-01 00:00:00.000 +0000,", ",", ", 3.0"],
            &cfg,
        )
        .expect("well-formed rows");
        assert_eq!(rec.series("SLOW").unwrap(), &[0.5, 0.5, 3.0]);
    }
}
