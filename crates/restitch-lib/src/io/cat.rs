use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// A recording split into its header records and sample rows, however it
/// was stored on disk.
#[derive(Debug, Clone)]
pub struct RecordingFile {
    /// One `{id: ..}` record per channel, in column order.
    pub header: Vec<String>,
    /// Raw comma-separated sample rows, in file order.
    pub rows: Vec<String>,
}

/// Split a concatenated recording: leading lines starting with `{id:`
/// are channel records, everything after is sample rows.
pub fn split_concatenated(text: &str) -> Result<RecordingFile> {
    let mut header = Vec::new();
    let mut rows = Vec::new();
    for line in text.lines() {
        if line.starts_with("{id:") {
            header.push(line.to_string());
        } else if !line.trim().is_empty() {
            rows.push(line.to_string());
        }
    }
    if header.is_empty() {
        bail!("no channel records found; not a concatenated recording");
    }
    Ok(RecordingFile { header, rows })
}

/// Resolve a recording from a base name or file path: a matching
/// `.hdr` + `.csv` pair, a `.cat` concatenated file, or a bare `.csv`
/// with embedded header records, in that order.
pub fn load_recording(input: &Path) -> Result<RecordingFile> {
    let base = input.with_extension("");
    let hdr = base.with_extension("hdr");
    let csv = base.with_extension("csv");
    let cat = base.with_extension("cat");

    if hdr.is_file() && csv.is_file() {
        log::info!("both csv and hdr files found");
        let header = read_lines(&hdr)?;
        let rows = read_lines(&csv)?;
        return Ok(RecordingFile { header, rows });
    }
    if cat.is_file() {
        log::info!("concatenated recording found");
        let text = fs::read_to_string(&cat)
            .with_context(|| format!("failed to read {}", cat.display()))?;
        return split_concatenated(&text);
    }
    if csv.is_file() {
        let text = fs::read_to_string(&csv)
            .with_context(|| format!("failed to read {}", csv.display()))?;
        return split_concatenated(&text)
            .with_context(|| format!("{} has no embedded header records", csv.display()));
    }
    bail!(
        "no viable recording found for {}; expected .hdr/.csv pair, .cat, or .csv with embedded header",
        input.display()
    );
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect())
}
