//! Delimited `(ha, hb, m)` tables.
//!
//! One reading per row, three columns. Rows starting with `#` are comments; a
//! single non-numeric row before the first reading is taken as the header.

use anyhow::{Context, Result, bail};
use forc_core::Sample;
use std::path::Path;

/// Delimiter implied by the file extension: tab for `.tsv`/`.tab`, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") => b'\t',
        _ => b',',
    }
}

pub fn read_samples(path: &Path, delimiter: Option<u8>) -> Result<Vec<Sample>> {
    let delimiter = delimiter.unwrap_or_else(|| delimiter_for(path));
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_samples(file, delimiter)
        .with_context(|| format!("invalid sample table {}", path.display()))
}

pub fn parse_samples<R: std::io::Read>(source: R, delimiter: u8) -> Result<Vec<Sample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut out = Vec::new();
    let mut header_seen = false;
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                return Err(e).with_context(|| format!("line {line}: unreadable row"));
            }
        };
        let line = record.position().map_or(0, |p| p.line());
        if record.len() != 3 {
            bail!("line {line}: expected 3 columns (ha, hb, m), found {}", record.len());
        }
        match record.deserialize::<(f64, f64, f64)>(None) {
            Ok((ha, hb, m)) => out.push(Sample::new(ha, hb, m)),
            Err(_) if out.is_empty() && !header_seen => header_seen = true,
            Err(e) => {
                return Err(e).with_context(|| format!("line {line}: non-numeric field"));
            }
        }
    }
    if out.is_empty() {
        bail!("no readings found");
    }
    Ok(out)
}
