use clap::Parser;
use leak_monitoring::{
    actors::store::{StoreHandle, StoreSettings},
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{HubConfig, read_hub_config},
    discovery::{DiscoveryRecord, ResponderHandle},
    util::{get_secret, resolve_bind_addr},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("leak_monitoring", LevelFilter::TRACE),
        ("leakwatch_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_hub_config(file)?,
        None => HubConfig::default(),
    };

    let store = StoreHandle::spawn(StoreSettings::from(&config));

    let api_config = ApiConfig {
        bind_addr: resolve_bind_addr(config.bind),
        auth_token: get_secret().or(config.secret.clone()),
        enable_cors: config.enable_cors,
    };
    let addr = spawn_api_server(api_config, ApiState::new(store.clone(), config.channels)).await?;

    let responder = if config.discovery.enabled {
        let record = DiscoveryRecord::for_hub(&config.name, addr);
        match ResponderHandle::spawn(&config.discovery, record).await {
            Ok(responder) => Some(responder),
            Err(e) => {
                warn!("discovery disabled, responder failed to start: {e:#}");
                None
            }
        }
    } else {
        None
    };

    info!("{} ready on {addr}", config.name);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(responder) = responder {
        responder.shutdown().await;
    }
    store.shutdown().await;

    Ok(())
}
