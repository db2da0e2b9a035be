use anyhow::{anyhow, Result};
use arscan::app::{ar_route, ar_url, simulate_route, ArHandoff, IncompleteReason, ResolutionReport, ScanOutcome};
use arscan::ar::SimulatedWalkthrough;
use arscan::config::DirectoryBackend;
use arscan::directory::{CodeDirectory, DirectorySnapshot, InMemoryDirectory, RestDirectory, ScanSink};
use arscan::recorder::{export_analytics, ClientEnvironment, HttpGeoLocator, LocationCache, ScanRecorder};
use arscan::resolver::IdentifierResolver;
use arscan::{ArScanConfig, EventBus};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "arscan")]
#[command(about = "Resolve scanned QR payloads to videos and record scans")]
#[command(version)]
#[command(long_about = "Command line front end for the arscan core: resolves decoded QR payloads \
against the code directory, prints analytics, runs the non-AR walkthrough and prints the routes \
a code hands off to.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "arscan.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a decoded payload and print the resolution report
    Resolve {
        text: String,
        /// Directory snapshot to use instead of the configured directory
        #[arg(long, value_name = "PATH")]
        snapshot: Option<String>,
    },
    /// Print the analytics export of a code
    Analytics {
        code_id: String,
        #[arg(long, value_name = "PATH")]
        snapshot: Option<String>,
    },
    /// Run the simulated walkthrough and record the scan
    Simulate {
        code_id: String,
        #[arg(long, value_name = "PATH")]
        snapshot: Option<String>,
    },
    /// Print the routes and printed URL of a code
    Routes { code_id: String },
}

/// Read and write halves of the configured directory
struct DirectoryHandles {
    codes: Arc<dyn CodeDirectory>,
    sink: Arc<dyn ScanSink>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting arscan v{}", env!("CARGO_PKG_VERSION"));

    let config = match ArScanConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let Some(command) = args.command else {
        eprintln!("No command given; see --help");
        std::process::exit(2);
    };

    match command {
        Command::Resolve { text, snapshot } => resolve(&config, &text, snapshot.as_deref()).await,
        Command::Analytics { code_id, snapshot } => {
            analytics(&config, &code_id, snapshot.as_deref()).await
        }
        Command::Simulate { code_id, snapshot } => {
            simulate(&config, &code_id, snapshot.as_deref()).await
        }
        Command::Routes { code_id } => {
            println!("ar:       {}", ar_route(&code_id));
            println!("simulate: {}", simulate_route(&code_id));
            println!("printed:  {}", ar_url(&config.directory.app_base_url, &code_id));
            Ok(())
        }
    }
}

async fn resolve(config: &ArScanConfig, text: &str, snapshot_path: Option<&str>) -> Result<()> {
    let directory = open_directory(config, snapshot_path)?;
    let snapshot = DirectorySnapshot::fetch(directory.codes.as_ref()).await?;
    let resolver = IdentifierResolver::new(config.resolver.clone());
    let resolution = resolver.resolve_detailed(text, &snapshot.codes);

    // Dry run: classify without recording a scan
    let outcome = match &resolution {
        None => ScanOutcome::NotRecognized,
        Some(resolution) => {
            let code = resolution.code;
            match snapshot.video(&code.video_id) {
                None => ScanOutcome::RecordIncomplete {
                    code_id: code.id.clone(),
                    reason: IncompleteReason::VideoMissing {
                        video_id: code.video_id.clone(),
                    },
                },
                Some(video) => match video.playable_url() {
                    None => ScanOutcome::RecordIncomplete {
                        code_id: code.id.clone(),
                        reason: IncompleteReason::NoPlayableUrl {
                            video_id: video.id.clone(),
                        },
                    },
                    Some(url) => ScanOutcome::Matched(ArHandoff {
                        code_id: code.id.clone(),
                        video_id: video.id.clone(),
                        title: video.title.clone(),
                        video_url: url.to_string(),
                        route: ar_route(&code.id),
                        scan_count: code.scan_count,
                        persistence_warning: None,
                    }),
                },
            }
        }
    };

    let report = ResolutionReport::new(text, &snapshot.codes, resolution.as_ref(), &outcome);
    println!("{}", report.to_json()?);
    Ok(())
}

async fn analytics(config: &ArScanConfig, code_id: &str, snapshot_path: Option<&str>) -> Result<()> {
    let directory = open_directory(config, snapshot_path)?;
    let snapshot = DirectorySnapshot::fetch(directory.codes.as_ref()).await?;
    let code = snapshot
        .code(code_id)
        .ok_or_else(|| anyhow!("Unknown code: {}", code_id))?;

    println!("{}", export_analytics(code, snapshot.video(&code.video_id))?);
    Ok(())
}

async fn simulate(config: &ArScanConfig, code_id: &str, snapshot_path: Option<&str>) -> Result<()> {
    let directory = open_directory(config, snapshot_path)?;
    let snapshot = DirectorySnapshot::fetch(directory.codes.as_ref()).await?;
    let code = snapshot
        .code(code_id)
        .ok_or_else(|| anyhow!("Unknown code: {}", code_id))?;

    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let location = if config.recorder.geolocation_enabled {
        let locator = HttpGeoLocator::from_config(&config.recorder)?;
        Some(LocationCache::new(
            Arc::new(locator),
            Duration::from_millis(config.recorder.geolocation_timeout_ms),
        ))
    } else {
        None
    };

    let recorder = ScanRecorder::new(
        Arc::clone(&directory.sink),
        ClientEnvironment::new(format!("arscan-cli/{}", env!("CARGO_PKG_VERSION"))),
        location,
        config.recorder.clone(),
        Arc::clone(&event_bus),
    );
    recorder.prefetch_location();

    let mut walkthrough = SimulatedWalkthrough::new(&config.ar, event_bus);
    let receipt = walkthrough.run(&recorder, code).await?;

    println!(
        "Simulated scan of {} recorded (scan count {})",
        receipt.code.id,
        receipt.scan_count()
    );
    if let Some(event) = receipt.scan_event {
        println!("{}", serde_json::to_string_pretty(&event)?);
    }
    Ok(())
}

fn open_directory(config: &ArScanConfig, snapshot_path: Option<&str>) -> Result<DirectoryHandles> {
    if let Some(path) = snapshot_path {
        let directory = Arc::new(InMemoryDirectory::from_snapshot_file(path)?);
        return Ok(DirectoryHandles {
            codes: directory.clone(),
            sink: directory,
        });
    }

    match config.directory.backend {
        DirectoryBackend::Snapshot => {
            let directory = Arc::new(InMemoryDirectory::from_snapshot_file(
                &config.directory.snapshot_path,
            )?);
            Ok(DirectoryHandles {
                codes: directory.clone(),
                sink: directory,
            })
        }
        DirectoryBackend::Rest => {
            let directory = Arc::new(RestDirectory::from_config(&config.directory)?);
            Ok(DirectoryHandles {
                codes: directory.clone(),
                sink: directory,
            })
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("arscan={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Logs go to stderr so command output stays machine-readable
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# arscan configuration file");
    println!("# Every key is optional; environment variables use the ARSCAN_ prefix");
    println!();
    println!("{}", toml::to_string_pretty(&ArScanConfig::default())?);
    Ok(())
}
