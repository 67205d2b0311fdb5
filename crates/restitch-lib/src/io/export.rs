use crate::signal::{RecordSet, TIMESTAMP_OUT_FORMAT};
use anyhow::Result;
use std::io::Write;

/// Write a reconstructed record set as CSV: a `Time` column in the
/// source timestamp format followed by one column per channel.
pub fn write_series_csv<W: Write>(writer: W, record: &RecordSet) -> Result<()> {
    let mut out = csv::WriterBuilder::new().from_writer(writer);

    let mut names = Vec::with_capacity(record.channels.len() + 1);
    names.push("Time".to_string());
    names.extend(record.channels.iter().map(|c| c.key.clone()));
    out.write_record(&names)?;

    let mut row = Vec::with_capacity(names.len());
    for (i, time) in record.times.iter().enumerate() {
        row.clear();
        row.push(time.format(TIMESTAMP_OUT_FORMAT).to_string());
        for channel in &record.channels {
            row.push(channel.data[i].to_string());
        }
        out.write_record(&row)?;
    }
    out.flush()?;
    Ok(())
}
