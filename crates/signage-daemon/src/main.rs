mod core;
mod http;
mod mpv;
mod playback;
mod presence;
mod telemetry;

use signage_proto::catalog::CatalogClient;
use signage_proto::config::Config;
use signage_proto::counter::CounterClient;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging — an unattended kiosk has no console to read.
    let data_dir = signage_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,signage_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let client = reqwest::Client::new();
    let catalog = CatalogClient::new(client.clone(), config.backend.base_url.clone());
    let counter = CounterClient::new(
        client.clone(),
        config.backend.base_url.clone(),
        config.backend.counter,
    );

    // Event channel — all external inputs funnel into SessionCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::SessionEvent>(256);

    // Player task (spawns and supervises mpv)
    let player_tx = mpv::start_player(event_tx.clone());

    let session = core::SessionCore::new(
        config.clone(),
        catalog,
        telemetry::TelemetrySync::new(counter),
        player_tx,
        event_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            session.status(),
        );
    }

    if config.device.tv_id > 0 {
        let _presence_handle =
            presence::start_reporter(client, config.backend.base_url.clone(), config.device.tv_id);
    } else {
        info!("No tv_id configured, presence reporting disabled");
    }

    info!("Daemon initialised, running session loop");
    session.run(event_rx).await?;

    Ok(())
}
