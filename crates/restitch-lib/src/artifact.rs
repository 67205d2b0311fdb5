use serde::{Deserialize, Serialize};

/// Thresholds for one slope-scan pass over a channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopePassConfig {
    /// Slope magnitude (amplitude units per sample) that flags an
    /// excursion as steep.
    pub steep_slope: f64,
    /// Slope magnitude below which the signal counts as flat again.
    pub not_flat: f64,
    /// Maximum plausible deviation inside an excursion window; larger
    /// excursions are judged artifacts and replaced with a linear ramp.
    pub scale_max: f64,
    /// Excursions that never turn steep within this many samples are
    /// abandoned untouched.
    pub abandon_after: usize,
}

impl Default for SlopePassConfig {
    fn default() -> Self {
        Self::coarse()
    }
}

impl SlopePassConfig {
    /// First, coarse pass over the raw aligned series.
    pub fn coarse() -> Self {
        Self {
            steep_slope: 0.5,
            not_flat: 0.05,
            scale_max: 3.0,
            abandon_after: 50,
        }
    }

    /// Second, finer pass run after baseline-wander removal.
    pub fn fine() -> Self {
        Self {
            steep_slope: 0.3,
            not_flat: 0.01,
            scale_max: 2.0,
            abandon_after: 50,
        }
    }
}

/// Windowed majority-vote polarity detection parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarityConfig {
    /// Length of each artifact-free sample window, in points.
    pub window: usize,
    /// Fraction of a window's points that must sit in one half of its
    /// range to classify the window.
    pub dominance: f64,
    /// Fraction of classified windows the winning vote must exceed
    /// before the channel is flipped.
    pub vote_threshold: f64,
}

impl Default for PolarityConfig {
    fn default() -> Self {
        Self {
            window: 1000,
            dominance: 0.75,
            vote_threshold: 0.60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub coarse: SlopePassConfig,
    pub fine: SlopePassConfig,
    /// Minimum run of consecutive equal non-sentinel values judged a
    /// stuck-sensor segment.
    pub flat_run_min: usize,
    pub polarity: PolarityConfig,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            coarse: SlopePassConfig::coarse(),
            fine: SlopePassConfig::fine(),
            flat_run_min: 10,
            polarity: PolarityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarityDecision {
    Inverted,
    Normal,
    Unknown,
}

/// Outcome of the polarity vote for one channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolarityOutcome {
    pub decision: PolarityDecision,
    /// Support for the winning vote, percent of classified windows.
    pub confidence: f64,
    /// Number of windows that produced a vote.
    pub windows: usize,
    pub flipped: bool,
}

impl PolarityOutcome {
    fn undecided() -> Self {
        Self {
            decision: PolarityDecision::Unknown,
            confidence: 0.0,
            windows: 0,
            flipped: false,
        }
    }
}

/// Coarse corrector pass: suppress stuck-sensor flat runs to the sentinel
/// and replace implausibly large steep excursions with a linear ramp.
/// Flat runs still open at end-of-data are judged there.
pub fn suppress_flat_and_spikes(
    data: &mut [f64],
    sentinel: f64,
    pass: &SlopePassConfig,
    flat_run_min: usize,
) {
    let mut rep_val: Option<f64> = None;
    let mut rv_start = 0usize;
    let mut exc: Option<(usize, f64)> = None;
    let mut steep_seen = false;
    let mut init_slope = 0.0;
    let mut closing = false;

    for i in 0..data.len() {
        let v = data[i];

        // Flat-run tracking. Runs are only reduced while no steep-slope
        // condition is flagged at the same position.
        if i > 0 && rep_val.is_none() && v != sentinel && v == data[i - 1] {
            rep_val = Some(v);
            rv_start = i - 1;
        }
        if let Some(rv) = rep_val {
            if v != rv {
                let run = i - rv_start;
                if run >= flat_run_min && !steep_seen {
                    for x in &mut data[rv_start..i] {
                        *x = sentinel;
                    }
                }
                rep_val = None;
            }
        }

        if i == 0 {
            continue;
        }
        let slope = v - data[i - 1];

        if exc.is_none() && slope.abs() >= pass.not_flat {
            exc = Some((i - 1, data[i - 1]));
        }
        if slope.abs() >= pass.steep_slope {
            steep_seen = true;
            init_slope = slope;
            if exc.is_none() {
                exc = Some((i - 1, data[i - 1]));
            }
        }
        if slope != 0.0
            && init_slope != 0.0
            && steep_seen
            && slope.abs() >= pass.not_flat
            && slope.signum() == -init_slope.signum()
        {
            closing = true;
        }

        if let Some((start, _)) = exc {
            if !steep_seen && i - start >= pass.abandon_after {
                exc = None;
                closing = false;
            }
        }

        if let Some((start, v_start)) = exc {
            if closing && slope != 0.0 && slope.abs() <= pass.not_flat && rep_val.is_none() {
                let v_start = if start == 0 { v } else { v_start };
                ramp_if_implausible(&mut data[start..i], v_start, v, pass.scale_max);
                exc = None;
                steep_seen = false;
                closing = false;
                init_slope = 0.0;
            }
        }
    }

    if rep_val.is_some() {
        let run = data.len() - rv_start;
        if run >= flat_run_min && !steep_seen {
            for x in &mut data[rv_start..] {
                *x = sentinel;
            }
        }
    }
}

/// Fine corrector pass plus polarity voting. Returns the vote outcome;
/// when the majority of classified windows say the waveform is upside
/// down, the whole channel is reflected about its mean and rescaled to
/// its original range.
pub fn suppress_spikes_and_vote(
    data: &mut [f64],
    pass: &SlopePassConfig,
    polarity: &PolarityConfig,
) -> PolarityOutcome {
    let mut exc: Option<(usize, f64)> = None;
    let mut steep_seen = false;
    let mut init_slope = 0.0;
    let mut closing = false;

    let mut samp_start: Option<usize> = None;
    let mut anchor = 0.0;
    let mut votes: Vec<PolarityDecision> = Vec::new();

    for i in 1..data.len() {
        let v = data[i];
        let slope = v - data[i - 1];

        if exc.is_none() && slope.abs() >= pass.not_flat {
            exc = Some((i - 1, data[i - 1]));
        }
        if slope.abs() >= pass.steep_slope {
            steep_seen = true;
            init_slope = slope;
            if exc.is_none() {
                exc = Some((i - 1, data[i - 1]));
            }
        }
        if slope != 0.0
            && init_slope != 0.0
            && steep_seen
            && slope.abs() >= pass.not_flat
            && slope.signum() == -init_slope.signum()
        {
            closing = true;
        }

        if let Some((start, _)) = exc {
            if !steep_seen && i - start >= pass.abandon_after {
                exc = None;
                closing = false;
            }
        }

        if let Some((start, v_start)) = exc {
            if closing && slope.abs() <= pass.not_flat {
                ramp_if_implausible(&mut data[start..i], v_start, v, pass.scale_max);
                exc = None;
                steep_seen = false;
                closing = false;
                init_slope = 0.0;
            }
        }

        // Polarity sampling: grow a window from the first flat slope and
        // restart whenever a steep rise or an out-of-scale value shows up,
        // so only artifact-free stretches are classified.
        if samp_start.is_none() && slope <= pass.not_flat {
            samp_start = Some(i - 1);
            anchor = v;
        }
        if samp_start.is_some() && (slope >= pass.steep_slope || (v - anchor).abs() > pass.scale_max)
        {
            samp_start = None;
        }
        if let Some(start) = samp_start {
            if i - start == polarity.window {
                votes.push(classify_window(&data[start..i], polarity.dominance));
                samp_start = None;
            }
        }
    }

    tally_votes(data, &votes, polarity)
}

fn classify_window(window: &[f64], dominance: f64) -> PolarityDecision {
    let max = window.iter().copied().fold(f64::MIN, f64::max);
    let min = window.iter().copied().fold(f64::MAX, f64::min);
    let mid = (max + min) / 2.0;
    let len = window.len() as f64;
    let top = window.iter().filter(|x| **x >= mid && **x <= max).count() as f64 / len;
    let bottom = window.iter().filter(|x| **x >= min && **x <= mid).count() as f64 / len;
    if top >= dominance {
        PolarityDecision::Inverted
    } else if bottom >= dominance {
        PolarityDecision::Normal
    } else {
        PolarityDecision::Unknown
    }
}

fn tally_votes(
    data: &mut [f64],
    votes: &[PolarityDecision],
    polarity: &PolarityConfig,
) -> PolarityOutcome {
    if votes.is_empty() {
        return PolarityOutcome::undecided();
    }
    let count_of = |d: PolarityDecision| votes.iter().filter(|v| **v == d).count();
    let best = votes
        .iter()
        .copied()
        .max_by_key(|v| count_of(*v))
        .expect("votes non-empty");
    let confidence =
        (count_of(best) as f64 / votes.len() as f64 * 10000.0).round() / 100.0;

    let flipped = best == PolarityDecision::Inverted
        && confidence > polarity.vote_threshold * 100.0;
    if flipped {
        log::info!("inverted signal detected, un-inverting");
        flip_signal(data);
    }
    PolarityOutcome {
        decision: best,
        confidence,
        windows: votes.len(),
        flipped,
    }
}

/// Reflect a series about its mean, then rescale so the original
/// min/max range is preserved.
pub fn flip_signal(data: &mut [f64]) {
    if data.is_empty() {
        return;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let min = data.iter().copied().fold(f64::MAX, f64::min);
    let max = data.iter().copied().fold(f64::MIN, f64::max);
    for x in data.iter_mut() {
        *x = (mean - *x) + mean;
    }
    scale_to(data, min, max);
}

fn scale_to(data: &mut [f64], lower: f64, upper: f64) {
    let min = data.iter().copied().fold(f64::MAX, f64::min);
    let max = data.iter().copied().fold(f64::MIN, f64::max);
    let range = max - min;
    if range == 0.0 {
        return;
    }
    for x in data.iter_mut() {
        *x = (upper - lower) * ((*x - min) / range) + lower;
    }
}

fn ramp_if_implausible(window: &mut [f64], v_start: f64, v_end: f64, scale_max: f64) {
    if window.is_empty() {
        return;
    }
    let most_dif = window
        .iter()
        .map(|x| (x - v_start).abs())
        .fold(0.0, f64::max);
    if most_dif < scale_max {
        log::debug!("excursion within scale, left untouched");
        return;
    }
    let step = (v_end - v_start) / window.len() as f64;
    let mut val = v_start;
    for x in window.iter_mut() {
        *x = val;
        val += step;
    }
}
