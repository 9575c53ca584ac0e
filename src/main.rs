//! CLI entry point for the GTFS-RT vehicle stream.
//!
//! `publish` polls the vehicle-position feed and republishes it onto the
//! stream, `watch` follows the stream in live or replay mode and renders the
//! latest state per vehicle, `dump` writes one decoded snapshot as JSON.

mod infra;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gtfs_rt_stream::{
    config::StreamConfig,
    consumer::{ConsumerState, FetchCycle},
    cursor::CursorManager,
    fetch::load_source,
    filter::{FilterSpec, Region},
    mode::Mode,
    output::{Frame, SnapshotDump, append_record, render_frame, write_json},
    parser::parse_feed,
    producer::{Producer, snapshot_to_updates},
    transport::{KinesisTransport, StreamTransport},
};
use std::ffi::OsStr;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_stream")]
#[command(about = "Publish and follow a GTFS-RT vehicle position stream", long_about = None)]
struct Cli {
    /// Stream name (overrides STREAM_NAME)
    #[arg(long, global = true)]
    stream: Option<String>,

    /// AWS region (overrides AWS_REGION)
    #[arg(long, global = true)]
    aws_region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed and publish one stream record per vehicle
    Publish {
        /// Path to file or URL to fetch (overrides GTFS_RT_URL)
        #[arg(value_name = "FILE_OR_URL")]
        source: Option<String>,

        /// Sample rate: poll the feed every X seconds
        #[arg(short = 'r', long, default_value_t = 30)]
        sample_rate: u64,

        /// Number of samples to publish (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 1)]
        num_samples: usize,
    },
    /// Follow the stream and show the latest state per vehicle.
    ///
    /// Type `live`, `replay` or `reset` on stdin to switch mode or start over.
    Watch {
        #[arg(short, long, value_enum, default_value_t = Mode::Live)]
        mode: Mode,

        /// Hide vehicles slower than this (mph)
        #[arg(long, default_value_t = 0.0)]
        min_speed: f64,

        #[arg(long, value_enum, default_value_t = Region::All)]
        region: Region,

        /// Only show these vehicle ids (repeatable)
        #[arg(long = "vehicle")]
        vehicles: Vec<String>,

        /// Maximum records folded per tick
        #[arg(long, default_value_t = 200)]
        batch_limit: usize,

        /// Pin reads to this shard instead of the first one listed
        #[arg(long)]
        shard: Option<String>,

        /// Number of ticks to run (0 = until Ctrl+C)
        #[arg(short = 'n', long, default_value_t = 0)]
        ticks: usize,

        /// Optional CSV file to append one report row per tick to
        #[arg(long)]
        report_csv: Option<String>,
    },
    /// Decode one feed snapshot and write its vehicles as JSON
    Dump {
        /// Path to file or URL to fetch (overrides GTFS_RT_URL)
        #[arg(value_name = "FILE_OR_URL")]
        source: Option<String>,

        /// Output file (overrides OUTPUT_PATH)
        #[arg(short, long)]
        output: Option<String>,

        /// Optional: S3 bucket to upload the dump to
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress the dump before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_stream.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_stream.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = StreamConfig::from_env();
    if let Some(stream) = cli.stream {
        config.stream_name = stream;
    }
    if let Some(region) = cli.aws_region {
        config.region = region;
    }

    match cli.command {
        Commands::Publish {
            source,
            sample_rate,
            num_samples,
        } => {
            if let Some(source) = source {
                config.feed_url = source;
            }
            publish(&config, sample_rate, num_samples).await?;
        }
        Commands::Watch {
            mode,
            min_speed,
            region,
            vehicles,
            batch_limit,
            shard,
            ticks,
            report_csv,
        } => {
            let settings = WatchSettings {
                spec: FilterSpec::new(min_speed, region, vehicles),
                ticks,
                report_csv,
            };
            watch(&config, mode, batch_limit, shard, settings).await?;
        }
        Commands::Dump {
            source,
            output,
            s3_bucket,
            gzip,
        } => {
            if let Some(source) = source {
                config.feed_url = source;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            dump(&config, s3_bucket, gzip).await?;
        }
    }

    Ok(())
}

/// Polls the feed at a fixed rate and republishes every snapshot.
///
/// A failed fetch or decode skips that sample; the loop keeps going.
#[tracing::instrument(skip(config), fields(stream = %config.stream_name, feed = %config.feed_url))]
async fn publish(config: &StreamConfig, sample_rate: u64, num_samples: usize) -> Result<()> {
    let transport = Arc::new(KinesisTransport::from_region(&config.region).await);
    let producer = Producer::new(transport, config.stream_name.clone());

    if num_samples == 0 {
        info!(sample_rate, "Publishing infinitely. Press Ctrl+C to stop.");
    } else {
        info!(num_samples, sample_rate, "Starting publish loop");
    }

    let mut sample_count = 0;
    loop {
        if num_samples > 0 && sample_count >= num_samples {
            break;
        }
        sample_count += 1;

        match load_source(&config.feed_url, config.api_key.as_deref()).await {
            Ok(bytes) => match parse_feed(&bytes) {
                Ok(feed) => {
                    let report = producer.publish_snapshot(&feed).await;
                    if report.failed > 0 {
                        warn!(
                            sample = sample_count,
                            failed = report.failed,
                            "Snapshot partially published"
                        );
                    }
                }
                Err(e) => error!(sample = sample_count, error = %e, "Feed parse failed"),
            },
            Err(e) => error!(sample = sample_count, error = %e, "Feed fetch failed"),
        }

        if num_samples == 0 || sample_count < num_samples {
            tokio::time::sleep(Duration::from_secs(sample_rate)).await;
        }
    }

    info!(samples = sample_count, "Finished publishing");
    Ok(())
}

/// Operator input read from stdin while watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    SwitchMode(Mode),
    Reset,
}

fn parse_control(line: &str) -> Option<Control> {
    match line.trim().to_ascii_lowercase().as_str() {
        "live" => Some(Control::SwitchMode(Mode::Live)),
        "replay" => Some(Control::SwitchMode(Mode::Replay)),
        "reset" => Some(Control::Reset),
        _ => None,
    }
}

fn spawn_control_reader() -> mpsc::UnboundedReceiver<Control> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_control(&line) {
                Some(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                None => warn!(
                    input = %line.trim(),
                    "Unknown command, expected live, replay or reset"
                ),
            }
        }
    });
    rx
}

/// Settings of one watch run that do not affect the stream position.
struct WatchSettings {
    spec: FilterSpec,
    /// Zero runs until interrupted.
    ticks: usize,
    report_csv: Option<String>,
}

/// Follows the stream until `ticks` is reached or Ctrl+C.
#[tracing::instrument(skip(config, settings), fields(stream = %config.stream_name))]
async fn watch(
    config: &StreamConfig,
    mode: Mode,
    batch_limit: usize,
    shard: Option<String>,
    settings: WatchSettings,
) -> Result<()> {
    let transport = Arc::new(KinesisTransport::from_region(&config.region).await);
    let mut cursors = CursorManager::new(transport, config.stream_name.clone());
    if let Some(shard) = shard {
        cursors = cursors.with_shard(shard);
    }
    let cycle = FetchCycle::with_cursor_manager(cursors).with_batch_limit(batch_limit);

    let mut state = ConsumerState::new(mode);
    let mut controls = spawn_control_reader();
    let tick_count = follow(
        &cycle,
        &mut state,
        &settings,
        &mut controls,
        tokio::signal::ctrl_c(),
    )
    .await;

    info!(
        ticks = tick_count,
        vehicles = state.cache().len(),
        seen = state.seen_ids().len(),
        "Stopped watching"
    );
    Ok(())
}

/// Ticks, renders and reports until `settings.ticks` is reached or `shutdown`
/// resolves. Returns the number of ticks started.
///
/// Replay ticks run faster than live ones so the backlog catches up.
async fn follow<T, S>(
    cycle: &FetchCycle<T>,
    state: &mut ConsumerState,
    settings: &WatchSettings,
    controls: &mut mpsc::UnboundedReceiver<Control>,
    shutdown: S,
) -> usize
where
    T: StreamTransport,
    S: Future,
{
    let mut requested = state.mode();
    let mut tick_count = 0;
    tokio::pin!(shutdown);

    loop {
        if settings.ticks > 0 && tick_count >= settings.ticks {
            break;
        }
        tick_count += 1;

        while let Ok(control) = controls.try_recv() {
            match control {
                Control::SwitchMode(next) => {
                    info!(mode = %next, "Mode requested");
                    requested = next;
                }
                Control::Reset => {
                    info!("Stream reset requested");
                    state.reset();
                }
            }
        }

        // A tick dropped here keeps its cursor in `state`.
        let outcome = tokio::select! {
            outcome = cycle.tick(state, requested) => outcome,
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
        };
        render_frame(&Frame::new(&outcome, &settings.spec));

        if let Some(path) = &settings.report_csv {
            if let Err(e) = append_record(path, &outcome.report) {
                error!(path = %path, error = %e, "Failed to append tick report");
            }
        }

        let cadence = match requested {
            Mode::Live => Duration::from_secs_f64(2.0),
            Mode::Replay => Duration::from_secs_f64(0.5),
        };
        tokio::select! {
            _ = tokio::time::sleep(cadence) => {}
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
        }
    }

    tick_count
}

/// Writes one decoded snapshot to disk and optionally to S3.
#[tracing::instrument(skip(config), fields(feed = %config.feed_url, output = %config.output_path))]
async fn dump(config: &StreamConfig, s3_bucket: Option<String>, gzip: bool) -> Result<()> {
    let bytes = load_source(&config.feed_url, config.api_key.as_deref()).await?;
    let feed = parse_feed(&bytes)?;

    let vehicles = snapshot_to_updates(&feed);
    if vehicles.is_empty() {
        warn!("Feed is empty (0 vehicles), writing an empty vehicle list");
    }
    let snapshot = SnapshotDump::new(feed.header.timestamp, vehicles);
    let body = write_json(&config.output_path, &snapshot)?;

    if let Some(bucket) = s3_bucket {
        let aws = aws_config::load_from_env().await;
        let s3 = aws_sdk_s3::Client::new(&aws);
        let key = format!(
            "realtime/date={}/realtime_dump_{}.json",
            Utc::now().format("%Y-%m-%d"),
            Utc::now().format("%H%M%S")
        );
        infra::s3::upload_json(&s3, &bucket, &key, body, gzip)
            .await
            .with_context(|| format!("failed to upload dump to s3://{bucket}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_rt_stream::transport::InMemoryStream;

    #[test]
    fn test_parse_control() {
        assert_eq!(parse_control("live"), Some(Control::SwitchMode(Mode::Live)));
        assert_eq!(parse_control(" Replay \n"), Some(Control::SwitchMode(Mode::Replay)));
        assert_eq!(parse_control("reset"), Some(Control::Reset));
        assert_eq!(parse_control("faster"), None);
    }

    #[test]
    fn test_cli_parses_watch_filters() {
        let cli = Cli::try_parse_from([
            "gtfs_rt_stream",
            "watch",
            "--mode",
            "replay",
            "--region",
            "salt-lake-city",
            "--vehicle",
            "1234",
            "--vehicle",
            "5678",
            "--min-speed",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch {
                mode,
                region,
                vehicles,
                min_speed,
                batch_limit,
                ..
            } => {
                assert_eq!(mode, Mode::Replay);
                assert_eq!(region, Region::SaltLakeCity);
                assert_eq!(vehicles, vec!["1234", "5678"]);
                assert_eq!(min_speed, 5.0);
                assert_eq!(batch_limit, 200);
            }
            _ => panic!("expected watch"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_a_stalled_tick() {
        let transport = Arc::new(InMemoryStream::new("buses", 1));
        let cycle = FetchCycle::new(transport.clone(), "buses");
        let mut state = ConsumerState::new(Mode::Live);
        let (_tx, mut controls) = mpsc::unbounded_channel();
        let settings = WatchSettings {
            spec: FilterSpec::default(),
            ticks: 0,
            report_csv: None,
        };

        transport.set_stalled(true);
        let ticks = tokio::time::timeout(
            Duration::from_secs(2),
            follow(
                &cycle,
                &mut state,
                &settings,
                &mut controls,
                tokio::time::sleep(Duration::from_millis(50)),
            ),
        )
        .await
        .unwrap();

        assert_eq!(ticks, 1);
        assert!(state.cursor().is_some());
    }

    #[tokio::test]
    async fn test_follow_applies_controls_and_stops_after_ticks() {
        let transport = Arc::new(InMemoryStream::new("buses", 1));
        let cycle = FetchCycle::new(transport, "buses");
        let mut state = ConsumerState::new(Mode::Live);
        let (tx, mut controls) = mpsc::unbounded_channel();
        tx.send(Control::SwitchMode(Mode::Replay)).unwrap();
        let settings = WatchSettings {
            spec: FilterSpec::default(),
            ticks: 1,
            report_csv: None,
        };

        let ticks = follow(
            &cycle,
            &mut state,
            &settings,
            &mut controls,
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(ticks, 1);
        assert_eq!(state.mode(), Mode::Replay);
    }
}
