use anyhow::{anyhow, Context, Result};
use cardio_lib::{
    analyze_rhythm,
    config::PipelineConfig,
    extract_record_features,
    io::{
        header_or_default, load_wfdb_record, parse_sample_matrix, read_header, read_sample_matrix,
        write_sample_matrix,
    },
    normalize::NormalizationMethod,
    plot::{figure_from_lead, Figure, Series},
    synth::{synthetic_record, SynthConfig},
    Waveform,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use plotters::prelude::*;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "cardio",
    version,
    about = "ECG conditioning, rhythm metrics and classifier input preparation"
)]
struct Cli {
    /// TOML pipeline configuration; missing keys keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the mains frequency removed by the notch filter
    #[arg(long, global = true)]
    mains_hz: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

/// Where a record comes from. Text input is CSV (samples × leads) or one
/// sample per line, read from `--input` or stdin.
#[derive(Args, Debug)]
struct Source {
    #[arg(long)]
    input: Option<PathBuf>,
    /// WFDB header (.hea) of a record to load instead of text input
    #[arg(long)]
    wfdb_header: Option<PathBuf>,
    /// Header to take the sample rate from when reading text input
    #[arg(long)]
    header: Option<PathBuf>,
    /// Sample rate (Hz). Overrides `--header`; for `--wfdb-header` it is
    /// used only when the header gives no rate
    #[arg(long)]
    fs: Option<f64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Method {
    #[value(name = "min-max")]
    MinMax,
    #[value(name = "z-score")]
    ZScore,
}

impl From<Method> for NormalizationMethod {
    fn from(m: Method) -> Self {
        match m {
            Method::MinMax => NormalizationMethod::MinMax,
            Method::ZScore => NormalizationMethod::ZScore,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Band-pass, notch and baseline-correct one lead
    Condition {
        #[command(flatten)]
        source: Source,
        #[arg(long, default_value_t = 0)]
        lead: usize,
    },
    /// Detect R-peaks in one conditioned lead
    FindRpeaks {
        #[command(flatten)]
        source: Source,
        #[arg(long, default_value_t = 0)]
        lead: usize,
    },
    /// RR intervals, heart rate and HRV of one lead
    Rhythm {
        #[command(flatten)]
        source: Source,
        #[arg(long, default_value_t = 0)]
        lead: usize,
    },
    /// Per-beat 36-wide feature vectors of a 12-lead record
    BeatFeatures {
        #[command(flatten)]
        source: Source,
    },
    /// Resample and normalize one lead to the single-lead classifier input
    Normalize {
        #[command(flatten)]
        source: Source,
        #[arg(long, default_value_t = 0)]
        lead: usize,
        #[arg(long)]
        target_length: Option<usize>,
        #[arg(long)]
        method: Option<Method>,
        /// Condition the lead first (record-file path)
        #[arg(long)]
        condition: bool,
    },
    /// Print a WFDB header's record line and patient metadata
    Header {
        #[arg(long)]
        path: PathBuf,
    },
    /// Write a synthetic multi-lead ECG as CSV
    Synth {
        #[arg(long, default_value_t = 500.0)]
        fs: f64,
        #[arg(long, default_value_t = 10.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 12)]
        leads: usize,
        #[arg(long, default_value_t = 0.8)]
        rr_s: f64,
        #[arg(long, default_value_t = 0.0)]
        rr_jitter_s: f64,
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        #[arg(long, default_value_t = 0.0)]
        wander: f64,
        #[arg(long, default_value_t = 0.0)]
        mains: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render a lead with its R-peaks to a PNG via plotters
    Plot {
        #[command(flatten)]
        source: Source,
        #[arg(long, default_value_t = 0)]
        lead: usize,
        #[arg(long, default_value_t = 10.0)]
        duration_s: f64,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(mains) = cli.mains_hz {
        config.conditioner.mains_hz = mains;
    }
    match cli.command {
        Commands::Condition { source, lead } => cmd_condition(&source, lead, &config)?,
        Commands::FindRpeaks { source, lead } => cmd_find_rpeaks(&source, lead, &config)?,
        Commands::Rhythm { source, lead } => cmd_rhythm(&source, lead, &config)?,
        Commands::BeatFeatures { source } => cmd_beat_features(&source, &config)?,
        Commands::Normalize {
            source,
            lead,
            target_length,
            method,
            condition,
        } => {
            if let Some(len) = target_length {
                config.normalizer.target_length = len;
            }
            if let Some(method) = method {
                config.normalizer.method = method.into();
            }
            cmd_normalize(&source, lead, condition, &config)?
        }
        Commands::Header { path } => print_json(&read_header(&path)?)?,
        Commands::Synth {
            fs,
            duration_s,
            leads,
            rr_s,
            rr_jitter_s,
            noise,
            wander,
            mains,
            seed,
            out,
        } => {
            let synth = SynthConfig {
                fs,
                duration_s,
                rr_s,
                rr_jitter_s,
                noise_amplitude: noise,
                wander_amplitude: wander,
                mains_amplitude: mains,
                mains_hz: config.conditioner.mains_hz,
                seed,
                ..SynthConfig::default()
            };
            cmd_synth(&synth, leads, out.as_deref())?
        }
        Commands::Plot {
            source,
            lead,
            duration_s,
            out,
        } => cmd_plot(&source, lead, duration_s, &out, &config)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Load the record named by `source`, falling back to `default_fs` when
/// neither `--fs` nor a readable header gives a sample rate.
fn load_waveform(source: &Source, default_fs: f64) -> Result<Waveform> {
    if let Some(header) = &source.wfdb_header {
        let fs = source.fs.unwrap_or(default_fs);
        return load_wfdb_record(header, fs);
    }
    let fs = match (source.fs, &source.header) {
        (Some(fs), _) => fs,
        (None, Some(header)) => header_or_default(header, default_fs).fs,
        (None, None) => default_fs,
    };
    let rows = match &source.input {
        Some(path) => read_sample_matrix(path)?,
        None => parse_sample_matrix(io::stdin().lock()).context("reading samples from stdin")?,
    };
    let waveform = Waveform::from_rows(fs, &rows)?;
    info!(
        "loaded {} leads × {} samples at {} Hz",
        waveform.lead_count(),
        waveform.len(),
        fs
    );
    Ok(waveform)
}

fn cmd_condition(source: &Source, lead: usize, config: &PipelineConfig) -> Result<()> {
    let waveform = load_waveform(source, config.defaults.rhythm_fs)?;
    let conditioned = config.conditioner().condition(&waveform.lead_series(lead)?);
    print_json(&conditioned)
}

#[derive(Serialize)]
struct PeakOutput {
    fs: f64,
    lead: usize,
    indices: Vec<usize>,
}

fn cmd_find_rpeaks(source: &Source, lead: usize, config: &PipelineConfig) -> Result<()> {
    let waveform = load_waveform(source, config.defaults.rhythm_fs)?;
    let conditioned = config.conditioner().condition(&waveform.lead_series(lead)?);
    let peaks = config.detector().detect(&conditioned.series);
    print_json(&PeakOutput {
        fs: waveform.fs(),
        lead,
        indices: peaks.indices,
    })
}

fn cmd_rhythm(source: &Source, lead: usize, config: &PipelineConfig) -> Result<()> {
    let waveform = load_waveform(source, config.defaults.rhythm_fs)?;
    let report = analyze_rhythm(&waveform, lead, config)?;
    print_json(&report)
}

fn cmd_beat_features(source: &Source, config: &PipelineConfig) -> Result<()> {
    let waveform = load_waveform(source, config.defaults.twelve_lead_fs)?;
    let outcome = extract_record_features(&waveform, config)?;
    print_json(&outcome)
}

fn cmd_normalize(
    source: &Source,
    lead: usize,
    condition: bool,
    config: &PipelineConfig,
) -> Result<()> {
    let waveform = load_waveform(source, config.defaults.single_lead_fs)?;
    let series = waveform.lead_series(lead)?;
    let normalizer = config.normalizer();
    let normalized = if condition {
        normalizer.prepare_record(&config.conditioner(), &series)?
    } else {
        normalizer.normalize(&series.data)?
    };
    print_json(&normalized)
}

fn cmd_synth(cfg: &SynthConfig, leads: usize, out: Option<&Path>) -> Result<()> {
    let waveform = synthetic_record(cfg, leads)?;
    match out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_sample_matrix(BufWriter::new(file), &waveform)
        }
        None => write_sample_matrix(io::stdout().lock(), &waveform),
    }
}

fn cmd_plot(
    source: &Source,
    lead: usize,
    duration_s: f64,
    out: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let waveform = load_waveform(source, config.defaults.rhythm_fs)?;
    let conditioned = config.conditioner().condition(&waveform.lead_series(lead)?);
    let peaks = config.detector().detect(&conditioned.series);
    let fig = figure_from_lead(
        &format!("lead {}", lead + 1),
        &conditioned.series,
        &peaks,
        duration_s,
        4096,
    );
    draw_plotters_figure(out, &fig)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    let (x_min, x_max, y_min, y_max) = fig.bounds().ok_or_else(|| anyhow!("nothing to plot"))?;
    let backend = BitMapBackend::new(path, (1200, 400));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "ECG".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.color.rgb();
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    RGBColor(r, g, b).stroke_width(line.width),
                ))?;
            }
            Series::Markers(marks) => {
                let (r, g, b) = marks.color.rgb();
                let style = RGBColor(r, g, b).filled();
                chart.draw_series(
                    marks
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), marks.size, style)),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
