use clap::Parser;
use partfetch::{Coordinator, RetryPolicy, TransferConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "partfetch")]
#[command(about = "Resumable, segmented HTTP(S) downloader", long_about = None)]
#[command(version)]
struct Args {
    /// Link to download (http://, https:// or thunder://)
    #[arg(default_value = "")]
    url: String,

    /// Number of segments the file is split into
    #[arg(short = 'n', long, default_value_t = 5)]
    segments: usize,

    /// Maximum number of segments downloading at once (default: all)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Directory the file is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Write buffer size per segment, in bytes
    #[arg(long, default_value_t = 100 * 1024)]
    chunk_size: usize,

    /// Extra attempts per segment after a transient failure
    #[arg(long, default_value_t = 0)]
    retries: usize,

    /// Delay between segment attempts, in milliseconds
    #[arg(long, default_value_t = 2000)]
    retry_delay_ms: u64,

    /// Deadline for a single segment attempt, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Only merge when every segment completed
    #[arg(long)]
    strict: bool,

    /// Compute the MD5 of the merged file
    #[arg(long)]
    md5: bool,

    /// Print the transfer report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("partfetch={}", log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = TransferConfig {
        segment_count: args.segments,
        max_concurrent_segments: args.concurrency,
        output_dir: args.output_dir,
        chunk_size: args.chunk_size,
        retry: RetryPolicy {
            max_retries: args.retries,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
            attempt_timeout: args.timeout_secs.map(Duration::from_secs),
        },
        require_all_segments: args.strict,
        verify_checksum: args.md5,
        show_progress: atty::is(atty::Stream::Stderr),
        ..TransferConfig::default()
    };

    let coordinator = Coordinator::new(config)?;
    match coordinator.download(&args.url).await {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if report.is_success() {
                info!(
                    "✅ {:?} ready ({})",
                    report.final_path,
                    humantime::format_duration(Duration::from_secs(report.elapsed.as_secs()))
                );
                Ok(())
            } else {
                error!(
                    "❌ Transfer ended in state {:?}, failed segments: {:?}, rerun to resume",
                    report.state,
                    report.failed_segments()
                );
                std::process::exit(1);
            }
        }
        Err(e) if e.is_config() => {
            error!("❌ {}", e);
            info!("Usage: partfetch <URL> (supported: http://, https://, thunder://)");
            std::process::exit(2);
        }
        Err(e) => {
            error!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}
