use crate::signal::Waveform;
use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use serde::Serialize;
use std::{fs, path::Path};

/// Record line of a WFDB `.hea` header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordHeader {
    pub name: String,
    pub signal_count: usize,
    pub fs: f64,
    pub sample_count: Option<usize>,
    /// Patient fields from the header comments, if any were present.
    pub metadata: Option<RecordMetadata>,
    /// `false` when the values are defaults standing in for a missing header.
    pub from_file: bool,
}

/// Patient fields carried in `#Key: value` header comments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordMetadata {
    pub age: Option<u32>,
    pub sex: Option<String>,
    pub diagnosis: Option<String>,
}

impl RecordMetadata {
    /// Collect `#Age`, `#Sex`/`#Sexe` and `#Dx`/`#Diagnostic` comments.
    /// Keys are case-insensitive; an age that is not a whole number is dropped.
    pub fn from_comments(text: &str) -> Option<Self> {
        let mut meta = Self::default();
        for line in text.lines() {
            let Some(comment) = line.trim().strip_prefix('#') else {
                continue;
            };
            let Some((key, value)) = comment.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim().to_ascii_lowercase().as_str() {
                "age" => {
                    meta.age = value
                        .split_whitespace()
                        .next()
                        .and_then(|v| v.parse().ok())
                }
                "sex" | "sexe" => meta.sex = Some(value.to_string()),
                "dx" | "diagnostic" | "diagnosis" => meta.diagnosis = Some(value.to_string()),
                _ => {}
            }
        }
        (meta != Self::default()).then_some(meta)
    }
}

impl RecordHeader {
    pub fn fallback(name: impl Into<String>, fs: f64) -> Self {
        Self {
            name: name.into(),
            signal_count: 1,
            fs,
            sample_count: None,
            metadata: None,
            from_file: false,
        }
    }
}

/// Parse the record line: `name nsig [fs[/counter[(base)]] [nsamp ...]]`,
/// plus any patient metadata in the comment lines.
pub fn parse_header(text: &str) -> Result<RecordHeader> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| anyhow!("header has no record line"))?;
    let mut fields = line.split_whitespace();
    let name = fields
        .next()
        .ok_or_else(|| anyhow!("record line is empty"))?
        .to_string();
    let signal_count: usize = fields
        .next()
        .ok_or_else(|| anyhow!("record line lacks a signal count"))?
        .parse::<usize>()
        .context("signal count is not an integer")?;
    let fs = match fields.next() {
        Some(raw) => {
            let value = raw.split(['/', '(']).next().unwrap_or(raw);
            let fs = value
                .parse::<f64>()
                .with_context(|| format!("sampling frequency is not numeric: {}", raw))?;
            if !(fs.is_finite() && fs > 0.0) {
                bail!("sampling frequency must be positive, got {}", fs);
            }
            fs
        }
        // WFDB's own default
        None => 250.0,
    };
    let sample_count = fields
        .next()
        .map(|raw| raw.parse::<usize>().context("sample count is not an integer"))
        .transpose()?;
    Ok(RecordHeader {
        name,
        signal_count,
        fs,
        sample_count,
        metadata: RecordMetadata::from_comments(text),
        from_file: true,
    })
}

pub fn read_header(path: &Path) -> Result<RecordHeader> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_header(&text).with_context(|| format!("in {}", path.display()))
}

/// Read the header, or fall back to `default_fs` with a warning.
pub fn header_or_default(path: &Path, default_fs: f64) -> RecordHeader {
    match read_header(path) {
        Ok(header) => header,
        Err(err) => {
            warn!("{:#}; assuming {} Hz", err, default_fs);
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            RecordHeader::fallback(name, default_fs)
        }
    }
}

/// Load every signal of a WFDB record into physical units.
pub fn load_wfdb_record(header_path: &Path, default_fs: f64) -> Result<Waveform> {
    if !header_path.is_file() {
        bail!("WFDB header {} not found", header_path.display());
    }
    let (header, signals) = wfdb_rust::parse_wfdb(header_path);
    if signals.is_empty() {
        bail!("WFDB record {} contains no signals", header_path.display());
    }
    let fs = header
        .record
        .sampling_frequency
        .map(|f| f as f64)
        .unwrap_or(default_fs);
    let mut leads = Vec::with_capacity(signals.len());
    for (lead, raw) in signals.iter().enumerate() {
        let channel = header
            .signal_specs
            .get(lead)
            .ok_or_else(|| anyhow!("no signal line for lead {}", lead))?;
        let gain = channel.adc_gain.unwrap_or(1.0) as f64;
        let gain = if gain == 0.0 { 1.0 } else { gain };
        let baseline = channel.baseline.or(channel.adc_zero).unwrap_or(0) as f64;
        leads.push(
            raw.iter()
                .map(|&sample| (sample as f64 - baseline) / gain)
                .collect(),
        );
    }
    Waveform::from_leads(fs, leads)
        .with_context(|| format!("WFDB record {}", header_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_record_line() {
        let header = parse_header("# comment\n100 2 360 650000\n100.dat 212 200 11 1024 995 -22131 0 MLII\n")
            .unwrap();
        assert_eq!(header.name, "100");
        assert_eq!(header.signal_count, 2);
        assert_eq!(header.fs, 360.0);
        assert_eq!(header.sample_count, Some(650000));
        assert!(header.from_file);
    }

    #[test]
    fn reads_patient_comments() {
        let text = "JS00001 12 500 5000\n\
                    JS00001.mat 16+24 1000/mV 16 0 -254 21756 0 I\n\
                    #Age: 85\n\
                    #Sex: Male\n\
                    #Dx: 164889003,59118001,164934002\n\
                    #Rx: Unknown\n";
        let header = parse_header(text).unwrap();
        assert_eq!(header.fs, 500.0);
        assert_eq!(
            header.metadata,
            Some(RecordMetadata {
                age: Some(85),
                sex: Some("Male".into()),
                diagnosis: Some("164889003,59118001,164934002".into()),
            })
        );
    }

    #[test]
    fn french_comment_keys_and_partial_metadata() {
        let meta = RecordMetadata::from_comments(
            "rec 1 360\n# age: 63 ans\n# Sexe: F\n# Diagnostic: insuffisance cardiaque: stade II\n",
        )
        .unwrap();
        assert_eq!(meta.age, Some(63));
        assert_eq!(meta.sex.as_deref(), Some("F"));
        assert_eq!(meta.diagnosis.as_deref(), Some("insuffisance cardiaque: stade II"));

        let meta = RecordMetadata::from_comments("#Age: NaN\n#Sex: Female\n").unwrap();
        assert_eq!(meta.age, None);
        assert_eq!(meta.sex.as_deref(), Some("Female"));

        assert_eq!(RecordMetadata::from_comments("# comment\n#Age:\n100 2 360"), None);
        assert_eq!(parse_header("100 2 360 650000").unwrap().metadata, None);
    }

    #[test]
    fn frequency_with_counter_and_base() {
        let header = parse_header("s0010_re 12 1000/2(0) 38400").unwrap();
        assert_eq!(header.fs, 1000.0);
        let header = parse_header("rec 1").unwrap();
        assert_eq!(header.fs, 250.0);
        assert_eq!(header.sample_count, None);
        assert!(parse_header("rec one 500").is_err());
        assert!(parse_header("rec 1 0").is_err());
    }

    #[test]
    fn missing_header_uses_defaults() {
        let header = header_or_default(Path::new("/nonexistent/rec42.hea"), 360.0);
        assert_eq!(header, RecordHeader::fallback("rec42", 360.0));
        assert!(!header.from_file);
    }

    #[test]
    fn unreadable_header_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# only comments").unwrap();
        let header = header_or_default(file.path(), 500.0);
        assert_eq!(header.fs, 500.0);
        assert!(!header.from_file);
    }

    #[test]
    fn missing_record_is_an_error() {
        assert!(load_wfdb_record(Path::new("/nonexistent/100.hea"), 360.0).is_err());
    }
}
