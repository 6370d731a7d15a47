use std::f32::consts::PI;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pulse_signals::{PulseConfig, PulsePipeline, SignalError, SignalSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pulse-cli", about = "Heart rate from per-frame RGB means")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate heart rate from an `r,g,b` sample stream
    Run {
        /// Input file (stdin if omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Force FastICA source separation on
        #[arg(long)]
        ica: bool,
    },
    /// Emit a synthetic `r,g,b` stream with a known pulse
    Simulate {
        #[arg(long)]
        bpm: f32,
        #[arg(long)]
        seconds: f32,
        #[arg(long, default_value_t = 15.0)]
        fps: f32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Peak amplitude of the uniform sensor noise
        #[arg(long, default_value_t = 0.3)]
        noise: f32,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(d) = "pulse_signals=info".parse() {
        filter = filter.add_directive(d);
    }
    if let Ok(d) = "pulse_cli=info".parse() {
        filter = filter.add_directive(d);
    }

    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn load_config(path: Option<&Path>) -> Result<PulseConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => PulseConfig::from_file_with_env(path)?,
        None => PulseConfig::load_layered(Some(Path::new("pulse.toml")), None)?,
    };
    Ok(config)
}

/// Parse one `r,g,b` line. `None` for blank lines, comments, headers and
/// lines carrying non-finite values.
fn parse_sample(line: &str) -> Option<[f32; 3]> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut fields = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .map(str::parse::<f32>);
    match (fields.next(), fields.next(), fields.next()) {
        (Some(Ok(r)), Some(Ok(g)), Some(Ok(b))) => {
            let rgb = [r, g, b];
            rgb.iter().all(|v| v.is_finite()).then_some(rgb)
        }
        _ => None,
    }
}

/// Counters from one pass over a sample stream.
#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    samples: usize,
    cycles: usize,
    skipped: usize,
}

/// Feed every sample line of `reader` through `pipeline`, writing one line
/// per cycle to `out`. The first data-less line is taken as a header.
fn run_stream<R: BufRead, W: Write>(
    reader: R,
    out: &mut W,
    pipeline: &mut PulsePipeline,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let mut summary = RunSummary::default();
    let mut header_seen = false;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let rgb = match parse_sample(trimmed) {
            Some(rgb) => rgb,
            None if !header_seen && summary.samples == 0 => {
                header_seen = true;
                continue;
            }
            None => {
                summary.skipped += 1;
                warn!("Skipping malformed line {}: {:?}", number + 1, line);
                continue;
            }
        };

        let output = match pipeline.ingest(rgb) {
            Ok(output) => output,
            Err(SignalError::InvalidFrame(reason)) => {
                summary.skipped += 1;
                warn!("Skipping line {}: {}", number + 1, reason);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        summary.samples += 1;

        if let Some(output) = output {
            summary.cycles += 1;
            let source = match output.source {
                SignalSource::Channel(channel) => channel.to_string(),
                SignalSource::Separated(index) => format!("ica[{}]", index),
            };
            let cycle = pipeline.cycles();
            match output.heart_rate.bpm() {
                Some(bpm) => writeln!(out, "cycle {}: {} bpm ({})", cycle, bpm, source)?,
                None => writeln!(out, "cycle {}: unknown ({})", cycle, source)?,
            }
        }
    }
    Ok(summary)
}

fn run(
    input: Option<PathBuf>,
    config_path: Option<PathBuf>,
    force_ica: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path.as_deref())?;
    if force_ica {
        config.separation.enabled = true;
    }
    info!(
        "Running at {} fps, {} sample window, source separation {}",
        config.capture.fps,
        config.buffer_capacity(),
        if config.separation.enabled { "on" } else { "off" }
    );

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };

    let mut pipeline = PulsePipeline::new(config)?;
    let mut out = io::stdout().lock();
    let summary = run_stream(reader, &mut out, &mut pipeline)?;

    if summary.cycles == 0 {
        warn!(
            "Input ended before the first window filled ({} of {} samples buffered)",
            pipeline.buffers().len(),
            pipeline.buffers().capacity()
        );
    }
    debug!(
        "Done: {} samples, {} cycles, {} lines skipped",
        summary.samples, summary.cycles, summary.skipped
    );
    Ok(())
}

/// Parameters of a synthetic sample stream.
#[derive(Debug, Clone, Copy)]
struct Synthetic {
    bpm: f32,
    seconds: f32,
    fps: f32,
    seed: u64,
    noise: f32,
}

/// Write a commented, headed `r,g,b` stream; returns the frame count.
fn write_synthetic<W: Write>(
    out: &mut W,
    params: Synthetic,
) -> Result<usize, Box<dyn std::error::Error>> {
    let Synthetic {
        bpm,
        seconds,
        fps,
        seed,
        noise,
    } = params;
    if !(fps > 0.0) || !(seconds >= 0.0) {
        return Err("fps must be positive and seconds non-negative".into());
    }
    let frames = (fps * seconds).round() as usize;
    let hz = bpm / 60.0;
    let mut rng = StdRng::seed_from_u64(seed);

    writeln!(out, "# synthetic pulse at {} bpm, {} fps, seed {}", bpm, fps, seed)?;
    writeln!(out, "r,g,b")?;
    for i in 0..frames {
        let t = i as f32 / fps;
        let pulse = (2.0 * PI * hz * t).sin();
        // Slow illumination drift shared by all channels
        let drift = 2.0 * (2.0 * PI * 0.05 * t).sin();
        let mut jitter = || if noise > 0.0 { rng.gen_range(-noise..noise) } else { 0.0 };
        let r = 150.0 + 0.3 * pulse + drift + jitter();
        let g = 110.0 + pulse + 0.8 * drift + jitter();
        let b = 90.0 + 0.1 * pulse + 0.9 * drift + jitter();
        writeln!(out, "{:.4},{:.4},{:.4}", r, g, b)?;
    }
    Ok(frames)
}

fn simulate(params: Synthetic) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = BufWriter::new(io::stdout().lock());
    let frames = write_synthetic(&mut out, params)?;
    out.flush()?;
    info!("Wrote {} frames", frames);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Commands::Run { input, config, ica } => run(input, config, ica)?,
        Commands::Simulate {
            bpm,
            seconds,
            fps,
            seed,
            noise,
        } => simulate(Synthetic {
            bpm,
            seconds,
            fps,
            seed,
            noise,
        })?,
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_formats() {
        assert_eq!(parse_sample("1.0,2.5,3"), Some([1.0, 2.5, 3.0]));
        assert_eq!(parse_sample("  1 2\t3 "), Some([1.0, 2.0, 3.0]));
        assert_eq!(parse_sample("1.0, 2.0, 3.0"), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_parse_sample_skips_non_data() {
        assert_eq!(parse_sample("r,g,b"), None);
        assert_eq!(parse_sample("# comment"), None);
        assert_eq!(parse_sample(""), None);
        assert_eq!(parse_sample("1.0,2.0"), None);
        assert_eq!(parse_sample("nan,2.0,3.0"), None);
        assert_eq!(parse_sample("1.0,inf,3.0"), None);
    }

    fn test_pipeline() -> PulsePipeline {
        let mut config = PulseConfig::default();
        config.capture.discard_duration_sec = 0.0;
        PulsePipeline::new(config).unwrap()
    }

    #[test]
    fn test_simulated_stream_round_trip() {
        let mut csv = Vec::new();
        let params = Synthetic {
            bpm: 72.0,
            seconds: 12.0,
            fps: 15.0,
            seed: 7,
            noise: 0.2,
        };
        assert_eq!(write_synthetic(&mut csv, params).unwrap(), 180);

        let mut out = Vec::new();
        let mut pipeline = test_pipeline();
        let summary = run_stream(csv.as_slice(), &mut out, &mut pipeline).unwrap();
        // 150-sample window, then one cycle per 15 new samples
        assert_eq!(
            summary,
            RunSummary {
                samples: 180,
                cycles: 3,
                skipped: 0
            }
        );

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cycle 1: "));
        assert!(lines.iter().all(|l| l.ends_with("(green)")));
        for line in &lines {
            let bpm: i32 = line
                .split_whitespace()
                .nth(2)
                .and_then(|v| v.parse().ok())
                .unwrap();
            assert!((bpm - 72).abs() <= 4, "{}", line);
        }
    }

    #[test]
    fn test_run_stream_counts_skipped_lines() {
        let input = "r,g,b\n# note\n\n1,2,3\nnot,a,sample\nnan,1,1\n4 5 6\n1,2\n";
        let mut out = Vec::new();
        let mut pipeline = test_pipeline();
        let summary = run_stream(input.as_bytes(), &mut out, &mut pipeline).unwrap();
        assert_eq!(
            summary,
            RunSummary {
                samples: 2,
                cycles: 0,
                skipped: 3
            }
        );
        assert!(out.is_empty());
        assert_eq!(pipeline.buffers().len(), 2);
    }

    #[test]
    fn test_write_synthetic_rejects_bad_rate() {
        let params = Synthetic {
            bpm: 72.0,
            seconds: 1.0,
            fps: 0.0,
            seed: 1,
            noise: 0.0,
        };
        assert!(write_synthetic(&mut Vec::new(), params).is_err());
    }
}
