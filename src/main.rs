//! CLI entry point for the TAN wait-time monitor.
//!
//! Provides subcommands for sampling the arrivals topic once, watching it over
//! several windows, summarising exported rows, feeding the topic from the
//! TAN open-data API and looking up stop timetables.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tan_waits::analyzers::aggregate::top_lines;
use tan_waits::analyzers::analyzer::{analyze, load_rows};
use tan_waits::analyzers::distances::summarize_distances;
use tan_waits::analyzers::types::{GroupKey, WindowReport};
use tan_waits::config::{
    BrokerConfig, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, DEFAULT_TOPIC, DelayConfig,
    SampleConfig, WatchConfig,
};
use tan_waits::fetch::BasicClient;
use tan_waits::infra::{MqttBroker, MqttPublisher, ReplayBroker};
use tan_waits::output::{append_rows, print_json, render_distances, render_report, render_table};
use tan_waits::sampler::sample_with;
use tan_waits::services::Broker;
use tan_waits::tan::{TanClient, resolve_stop_name};
use tan_waits::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "tan_waits")]
#[command(about = "Wait-time statistics for the TAN arrivals feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the topic once and print wait-time and delay statistics
    Sample {
        #[command(flatten)]
        sampling: SampleArgs,

        /// CSV file to append the sampled rows to
        #[arg(long, value_name = "FILE")]
        rows_out: Option<PathBuf>,
    },
    /// Repeat sample + aggregate on a fixed interval
    Watch {
        #[command(flatten)]
        sampling: SampleArgs,

        /// Number of windows to run (0 = until Ctrl+C)
        #[arg(short, long, default_value_t = 10)]
        iterations: usize,

        /// Seconds to sleep between windows
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,

        /// Keep rows across windows for this many seconds instead of starting fresh
        #[arg(long)]
        retain_secs: Option<u64>,
    },
    /// Mean wait per line from exported row CSVs
    Report {
        /// Rows CSV file, or a directory of them
        #[arg(value_name = "FILE_OR_DIR")]
        input: PathBuf,

        /// Number of lines to keep, longest waits first
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Log the result as JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Also summarise distances of the stops around this latitude
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude paired with --lat
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
    },
    /// Print the timetable of a line at a stop
    Timetable {
        /// Stop code, e.g. HBLI2
        stop: String,

        /// Line number, e.g. C5
        line: String,

        /// Direction (1 or 2)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        sens: u8,

        /// Day to look up (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Publish TAN wait times for some stops to the topic
    Produce {
        #[command(flatten)]
        broker: BrokerArgs,

        /// Stop code to publish (repeatable), e.g. HBLI2
        #[arg(short = 's', long = "stop", required = true)]
        stops: Vec<String>,

        /// Number of publish rounds (0 = infinite)
        #[arg(short = 'r', long, default_value_t = 1)]
        rounds: usize,

        /// Seconds between rounds
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        /// Only publish the next N arrivals per stop
        #[arg(long)]
        passages: Option<usize>,

        /// Restrict --passages to one line
        #[arg(long, requires = "passages")]
        line: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
struct BrokerArgs {
    /// MQTT broker host
    #[arg(long, env = "TAN_BROKER_HOST", default_value = DEFAULT_BROKER_HOST)]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, env = "TAN_BROKER_PORT", default_value_t = DEFAULT_BROKER_PORT)]
    broker_port: u16,

    /// Topic carrying arrival messages
    #[arg(short, long, env = "TAN_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,
}

impl BrokerArgs {
    fn config(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.broker_host.clone(),
            port: self.broker_port,
            ..BrokerConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SampleArgs {
    #[command(flatten)]
    broker: BrokerArgs,

    /// Replay a JSON-lines capture instead of connecting to the broker
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Maximum number of messages per window
    #[arg(short = 'n', long, env = "TAN_MAX_MESSAGES", default_value_t = 100)]
    max_messages: usize,

    /// Seconds a window may spend reading
    #[arg(long, env = "TAN_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Fields to group wait times by, comma separated
    #[arg(short, long, value_enum, value_delimiter = ',', default_values_t = [GroupKey::Line])]
    group_by: Vec<GroupKey>,

    /// Expected wait in minutes
    #[arg(long, env = "TAN_TYPICAL_WAIT", default_value_t = 10.0)]
    typical_wait: f64,

    /// A wait above typical_wait * ratio counts as delayed
    #[arg(long, env = "TAN_THRESHOLD_RATIO", default_value_t = 1.5)]
    threshold_ratio: f64,

    /// Log reports as JSON instead of tables
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl SampleArgs {
    fn broker(&self) -> Box<dyn Broker> {
        match &self.replay {
            Some(path) => Box::new(ReplayBroker::new(path)),
            None => Box::new(MqttBroker::new(self.broker.config())),
        }
    }

    fn sample_config(&self) -> SampleConfig {
        SampleConfig {
            topic: self.broker.topic.clone(),
            max_messages: self.max_messages,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    fn delay_config(&self) -> DelayConfig {
        DelayConfig {
            typical_wait: self.typical_wait,
            threshold_ratio: self.threshold_ratio,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Sample { sampling, rows_out } => {
            let broker = sampling.broker();
            let rows = sample_with(broker.as_ref(), &sampling.sample_config()).await?;

            if let Some(path) = &rows_out {
                append_rows(path, &rows)?;
                info!(path = %path.display(), rows = rows.len(), "Rows exported");
            }

            let report = analyze(&rows, &sampling.group_by, &sampling.delay_config())?;
            show_report(&report, sampling.json)?;
        }
        Commands::Watch {
            sampling,
            iterations,
            interval_secs,
            retain_secs,
        } => {
            let broker = sampling.broker();
            let config = WatchConfig {
                iterations,
                interval: Duration::from_secs(interval_secs),
                group_by: sampling.group_by.clone(),
                retain: retain_secs.map(Duration::from_secs),
            };

            let json = sampling.json;
            watch::run(
                broker.as_ref(),
                &sampling.sample_config(),
                &sampling.delay_config(),
                &config,
                |iteration, report| {
                    info!(iteration, rows = report.rows, "Window complete");
                    if let Err(e) = show_report(report, json) {
                        error!(error = %e, "Failed to render report");
                    }
                },
                interrupted(),
            )
            .await?;
        }
        Commands::Report {
            input,
            top,
            json,
            lat,
            lon,
        } => {
            let rows = load_rows(&input)?;
            let lines = top_lines(&rows, top);

            if json {
                info!("{}", serde_json::to_string_pretty(&lines)?);
            } else {
                println!("Mean wait per line (top {top})\n{}", render_table(&lines));
            }

            if let (Some(lat), Some(lon)) = (lat, lon) {
                let tan = TanClient::new(BasicClient::new()?);
                let stops = tan.nearby_stops(lat, lon).await?;
                let distances: Vec<f64> = stops.iter().filter_map(|s| s.distance_meters()).collect();

                match summarize_distances(&distances) {
                    Some(summary) if json => info!("{}", serde_json::to_string_pretty(&summary)?),
                    Some(summary) => {
                        println!("Stop distances around {lat}, {lon}\n{}", render_distances(&summary))
                    }
                    None => warn!(lat, lon, stops = stops.len(), "No stop distances to summarise"),
                }
            }
        }
        Commands::Timetable {
            stop,
            line,
            sens,
            date,
        } => {
            let tan = TanClient::new(BasicClient::new()?);
            let timetable = tan.timetable(&stop, &line, sens, date).await?;

            if let Some(period) = &timetable.service_period {
                println!("{period}");
            }
            for slot in &timetable.hours {
                println!("{:>4}  {}", slot.heure, slot.passages.join(" "));
            }
            for note in &timetable.notes {
                println!("{}: {}", note.code, note.libelle);
            }
        }
        Commands::Produce {
            broker,
            stops,
            rounds,
            interval_secs,
            passages,
            line,
        } => {
            let limit = passages.map(|n| (n, line));
            produce(&broker, &stops, rounds, interval_secs, limit).await?;
        }
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/tan_waits.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("tan_waits.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

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

    Ok(guard)
}

fn show_report(report: &WindowReport, json: bool) -> Result<()> {
    if json {
        print_json(report)
    } else {
        println!("{}", render_report(report));
        Ok(())
    }
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
/// The handler is installed on first poll.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("Interrupt received");
}

/// Fetches wait times for each stop from the TAN API and publishes them to
/// the topic, one message per stop per round. `limit` keeps only the next N
/// arrivals, optionally of one line.
#[tracing::instrument(skip(broker), fields(topic = %broker.topic))]
async fn produce(
    broker: &BrokerArgs,
    stops: &[String],
    rounds: usize,
    interval_secs: u64,
    limit: Option<(usize, Option<String>)>,
) -> Result<()> {
    let tan = TanClient::new(BasicClient::new()?);

    let places = match tan.stops().await {
        Ok(places) => places,
        Err(e) => {
            warn!(error = %e, "Stop list unavailable, publishing without stop names");
            Vec::new()
        }
    };

    let mut publisher = MqttPublisher::connect(&broker.config()).await?;

    let mut round = 0;
    loop {
        if rounds > 0 && round >= rounds {
            break;
        }
        round += 1;
        info!(round, stops = stops.len(), "Starting publish round");

        for stop_code in stops {
            let stop_name = resolve_stop_name(&places, stop_code).map(str::to_string);

            let fetched = match &limit {
                Some((passages, line)) => {
                    tan.limited_arrival_message(stop_code, stop_name, *passages, line.as_deref())
                        .await
                }
                None => tan.arrival_message(stop_code, stop_name).await,
            };

            match fetched {
                Ok(message) => match publisher.publish_json(&broker.topic, &message).await {
                    Ok(()) => {
                        info!(stop_code = %stop_code, arrivals = message.arrivals.len(), "Arrivals published")
                    }
                    Err(e) => error!(stop_code = %stop_code, error = %e, "Publish failed"),
                },
                Err(e) => error!(stop_code = %stop_code, error = %e, "Wait time fetch failed"),
            }
        }

        if rounds == 0 || round < rounds {
            info!(interval_secs, "Waiting before next round");
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    }

    publisher.close().await;
    info!(rounds = round, "Finished publishing");
    Ok(())
}
