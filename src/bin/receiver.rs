use anyhow::Result;
use clap::Parser;
use framecast::receiver::FrameReceiver;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "framecast-receiver")]
#[command(about = "Accept framecast producers and account for the frames they stream")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080", help = "Listen address, host:port")]
    bind: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let receiver = FrameReceiver::bind(&args.bind).await.map_err(|e| {
        error!("Failed to start receiver: {}", e);
        e
    })?;
    info!("Waiting for producers on {}", receiver.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Received SIGINT signal (Ctrl+C)");

    receiver.shutdown().await;

    let stats = receiver.stats();
    info!(
        "Received {} frames ({} bytes) over {} sessions, {} stop requests, {} producers rejected",
        stats.frames, stats.bytes, stats.sessions, stats.stop_requests, stats.rejected
    );
    Ok(())
}

fn init_logging(args: &Args) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // The receiver is interactive, so progress is shown by default
    let log_level = if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("framecast={}", log_level)));

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(args.verbose))
        .with(env_filter)
        .init();
}
