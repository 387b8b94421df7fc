use crate::signal::Waveform;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::{
    io::{Read, Write},
    path::Path,
};

/// Parse comma-separated rows of samples × leads (a single column is one
/// lead). A leading row that is not numeric is taken as a header and skipped.
pub fn parse_sample_matrix<R: Read>(input: R) -> Result<Vec<Vec<f64>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(input);
    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("reading row {}", idx + 1))?;
        match parse_row(&record) {
            Some(row) => rows.push(row),
            None if idx == 0 => continue,
            None => anyhow::bail!("row {} is not numeric: {:?}", idx + 1, record),
        }
    }
    if rows.is_empty() {
        anyhow::bail!("no numeric rows found");
    }
    Ok(rows)
}

fn parse_row(record: &StringRecord) -> Option<Vec<f64>> {
    record.iter().map(|field| field.parse().ok()).collect()
}

pub fn read_sample_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    parse_sample_matrix(file).with_context(|| format!("in {}", path.display()))
}

/// Write a waveform as CSV, one row per sample, with a `lead_N` header.
pub fn write_sample_matrix<W: Write>(out: W, waveform: &Waveform) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    let header: Vec<String> = (1..=waveform.lead_count())
        .map(|n| format!("lead_{}", n))
        .collect();
    writer.write_record(&header)?;
    let leads: Vec<&[f64]> = waveform.leads().collect();
    for i in 0..waveform.len() {
        writer.write_record(leads.iter().map(|lead| lead[i].to_string()))?;
    }
    writer.flush().context("flushing CSV output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_with_and_without_header() {
        let rows = parse_sample_matrix("i,ii\n0.1, 0.2\n0.3,0.4\n".as_bytes()).unwrap();
        assert_eq!(rows, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        let rows = parse_sample_matrix("1,2,3\n4,5,6\n".as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = parse_sample_matrix("# comment\nlead_1\n0.5\n-1\n".as_bytes()).unwrap();
        assert_eq!(rows, vec![vec![0.5], vec![-1.0]]);
        assert!(parse_sample_matrix("# nothing\n".as_bytes()).is_err());
        assert!(parse_sample_matrix("1,2\nx,y\n".as_bytes()).is_err());
    }

    #[test]
    fn written_matrix_reads_back() {
        let wf = Waveform::from_leads(250.0, vec![vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 0.25]]).unwrap();
        let mut buf = Vec::new();
        write_sample_matrix(&mut buf, &wf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("lead_1,lead_2\n"));
        let rows = parse_sample_matrix(text.as_bytes()).unwrap();
        let back = Waveform::from_rows(250.0, &rows).unwrap();
        assert_eq!(back.lead(1), Some(&[-1.0, 0.5, 0.25][..]));
    }
}
