use deck_daemon::catalog::{build_catalog, MediaCatalog};
use deck_daemon::http::{self, HttpState};
use deck_daemon::mpv::MpvEngine;
use deck_daemon::orchestrator::Orchestrator;
use deck_daemon::speaker::StaticDiscovery;
use deck_daemon::surface::{open_first, JsonFaceRenderer, VirtualDeck, VirtualDriver};
use deck_daemon::synchronizer::{ButtonSynchronizer, SyncOptions};
use deck_daemon::workers::WorkerTimings;
use deck_proto::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const VIRTUAL_DECK_KEYS: usize = 6;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = deck_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = std::env::var_os("DECK_LOG_STDERR")
        .map(|_| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,deck_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Arc::new(Config::load()?);
    info!("Config loaded from: {:?}", Config::config_path());

    let catalog = Arc::new(MediaCatalog::new(build_catalog(&config, &[])));
    info!("Catalog: {} media objects", catalog.len());

    let engine = Arc::new(MpvEngine::new(config.engine.default_volume));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&catalog),
        engine,
        WorkerTimings::from(&config.engine),
        config.engine.default_volume,
    ));

    // Without a speaker, remote favorites in the catalog fail as unsupported.
    match orchestrator
        .connect_remote_speaker(&StaticDiscovery::default(), config.speaker.name.as_deref())
        .await
    {
        Ok(()) => {
            let favorites = orchestrator.remote_favorites().await;
            catalog.replace(build_catalog(&config, &favorites));
            info!("Catalog: {} media objects with speaker favorites", catalog.len());
        }
        Err(e) => warn!("Remote speaker disabled: {}", e),
    }

    let mut http_state = HttpState::new(Arc::clone(&orchestrator), Arc::clone(&config));

    let synchronizer = if config.deck.enabled {
        let deck = VirtualDeck::new("virtual deck", VIRTUAL_DECK_KEYS);
        let driver = VirtualDriver::new(vec![deck.clone()]);
        match open_first(&driver) {
            Ok(surface) => match ButtonSynchronizer::new(
                Arc::clone(&orchestrator),
                surface,
                Arc::new(JsonFaceRenderer),
                SyncOptions::from(&config.deck),
            )
            .spawn()
            {
                Ok(handle) => {
                    http_state = http_state.with_deck(handle.control(), Some(deck));
                    Some(handle)
                }
                Err(e) => {
                    warn!("Button synchronization disabled: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Button synchronization disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let _http_handle = if config.http.enabled {
        Some(http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http_state,
        ))
    } else {
        None
    };

    info!("Daemon initialised");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(handle) = synchronizer {
        handle.close(Duration::from_secs(2)).await;
    }
    orchestrator.close().await;
    Ok(())
}
