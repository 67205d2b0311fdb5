use thiserror::Error;

/// Fatal, structural failures. Per-row and per-sample irregularities
/// (blank cells, short rows, timestamp gaps) are recovered in place and
/// surfaced through [`crate::pipeline::Diagnostics`] instead.
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("channel record {index}: missing or malformed attribute `{attribute}`")]
    MalformedHeader { index: usize, attribute: &'static str },

    #[error("first row carries no absolute timestamp; cannot anchor the timeline")]
    TimelineInit,

    #[error("row {row}: cannot parse timestamp `{token}`: {source}")]
    BadTimestamp {
        row: usize,
        token: String,
        #[source]
        source: chrono::ParseError,
    },
}
