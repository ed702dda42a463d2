//! Headless stream observer
//!
//! Subscribes to a hub's leak stream and logs snapshots, updates and alerts as they
//! arrive.

use clap::Parser;
use leak_monitoring::{actors::messages::HubEvent, watch::StreamClient};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "leakwatch-watch")]
#[command(about = "Follow a hub's leak alerts in real time", long_about = None)]
struct Args {
    /// Hub API URL
    #[arg(short, long, value_name = "URL", default_value = "http://127.0.0.1:8080")]
    url: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("leak_monitoring", LevelFilter::INFO),
        ("leakwatch_watch", LevelFilter::TRACE),
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

    let mut events = StreamClient::new(&args.url).connect();

    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Snapshot(snapshot) => info!(
                "snapshot: {} devices, {} sensors, {} alerts",
                snapshot.devices.len(),
                snapshot.sensors.len(),
                snapshot.alerts.len()
            ),
            HubEvent::Update(snapshot) => {
                let online = snapshot.devices.iter().filter(|d| d.is_online()).count();
                let wet = snapshot.sensors.values().filter(|s| s.alert).count();
                info!(
                    "update: {online}/{} devices online, {wet} sensors alerting, {} alerts",
                    snapshot.devices.len(),
                    snapshot.alerts.len()
                );
            }
            HubEvent::Alert(alert) => warn!(
                "LEAK #{}: sensor {} ({}) on {} - value {} (threshold {})",
                alert.id, alert.sensor, alert.location, alert.device_ip, alert.value, alert.threshold
            ),
        }
    }

    Ok(())
}
