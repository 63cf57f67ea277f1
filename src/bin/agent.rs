use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use outage_agent::{
    actors::{poller::OutageMetricPollerHandle, server::OutageServerHandle},
    bus::{BusClient, ChannelBus},
    config::{read_config_file, Config},
    shm::{MemoryShm, MetricShm},
    store::{AssetStore, SharedAssetStore},
    util, AGENT_NAME, STREAM_ALERTS, STREAM_ASSETS, STREAM_METRICS_UNAVAILABLE,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "outage-agent", disable_version_flag = true)]
#[command(about = "Sends alerts when a device stops communicating")]
struct Args {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Path to config file
    #[arg(short, long, default_value = "/etc/outage-agent/outage-agent.cfg")]
    config: String,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let filter = filter::Targets::new().with_targets(vec![("outage_agent", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            print!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprint!("{e}");
            return ExitCode::FAILURE;
        }
    };

    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.config).unwrap_or_else(|e| {
        debug!("cannot read config file {}: {e:#}, using defaults", args.config);
        Config::default()
    });

    match run_agent(config, args.verbose).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run the two-actor outage detection system until interrupted.
async fn run_agent(config: Config, verbose: bool) -> anyhow::Result<()> {
    let (bus, mut alert_rx, mut request_rx) = ChannelBus::new();
    let bus: Arc<dyn BusClient> = Arc::new(bus);
    let shm: Arc<dyn MetricShm> = Arc::new(MemoryShm::new());
    let store: SharedAssetStore = Arc::new(Mutex::new(AssetStore::new()));

    let poll_secs = config
        .server
        .polling_interval
        .unwrap_or_else(util::get_polling_interval)
        .max(1);
    let poll_interval = Duration::from_secs(poll_secs);

    // the transport adapter owns _bus_tx and feeds decoded bus traffic in
    let (_bus_tx, bus_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(256);

    let server = OutageServerHandle::spawn(
        bus.clone(),
        store.clone(),
        bus_rx,
        event_rx,
        poll_interval,
    );
    info!("outage server actor started");

    let poller = OutageMetricPollerHandle::spawn(shm, store, event_tx, poll_interval);
    info!("metric poller actor started (interval: {poll_secs}s)");

    // drain outbound traffic; a transport adapter forwards it to the fleet
    tokio::spawn(async move {
        while let Some((subject, alert)) = alert_rx.recv().await {
            info!("alert '{subject}' is '{}'", alert.state);
        }
    });
    tokio::spawn(async move {
        while let Some(req) = request_rx.recv().await {
            debug!("mailbox request to {}: {}", req.address, req.subject);
        }
    });

    // bootstrap with the frame sequence operators know from the wire
    server
        .send_frames(&["STATE_FILE", &config.server.state_file])
        .await;
    server
        .send_frames(&["CONNECT", &config.server.endpoint, AGENT_NAME])
        .await;
    server.send_frames(&["PRODUCER", STREAM_ALERTS]).await;
    server
        .send_frames(&["CONSUMER", STREAM_METRICS_UNAVAILABLE, ".*"])
        .await;
    server.send_frames(&["CONSUMER", STREAM_ASSETS, ".*"]).await;
    server
        .send_frames(&[
            "DEFAULT_MAINTENANCE_EXPIRATION_SEC",
            &config.server.maintenance_expiration.to_string(),
        ])
        .await;
    if verbose {
        server.send_frames(&["VERBOSE"]).await;
    }

    info!("press Ctrl+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping actors..."),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    poller.shutdown().await;
    server.shutdown().await;

    // let the final state save land before the runtime goes away
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
