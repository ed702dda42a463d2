use clap::Parser;
use leak_monitoring::{
    actors::device::DeviceHandle,
    config::{DeviceConfig, read_device_config},
    monitors::sensors::source_from_config,
    util::get_secret,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Static hub address, used when discovery finds nothing
    #[arg(long)]
    hub: Option<String>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("leak_monitoring", LevelFilter::TRACE),
        ("leakwatch_device", LevelFilter::TRACE),
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

    let mut config = match &args.file {
        Some(file) => read_device_config(file)?,
        None => DeviceConfig::default(),
    };
    if let Some(hub) = args.hub {
        config.hub = Some(hub);
    }
    if config.token.is_none() {
        config.token = get_secret();
    }
    config.validate()?;

    let source = source_from_config(&config.source)?;
    info!(
        "starting {} device with {} channels",
        config.chip,
        config.channels.len()
    );
    let device = DeviceHandle::spawn(config, source);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    device.shutdown().await?;
    device.closed().await;

    Ok(())
}
