use std::process::ExitCode;
use std::sync::Arc;

use cryptai::app;
use cryptai::chat::ConversationController;
use cryptai::settings::SettingsStore;
use cryptai_relay::HttpRelay;
use tracing_subscriber::EnvFilter;

/// Terminal client for the crypt ai relay.
///
/// 1. Tracing to stderr, filtered by `RUST_LOG` (warnings by default)
/// 2. Settings from the config file and `CRYPTAI_*` variables
/// 3. Relay client and a non-fatal health check
/// 4. Prompt loop until stdin closes or `/quit`
#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store = SettingsStore::load();
    match store.ensure_file() {
        Ok(true) => println!("wrote default settings to {}", store.config_path().display()),
        Ok(false) => {}
        Err(error) => tracing::warn!(%error, "could not write default settings"),
    }
    let settings = store.settings();

    let relay = match HttpRelay::new(settings.relay_config()) {
        Ok(relay) => Arc::new(relay),
        Err(error) => {
            tracing::error!(%error, "failed to set up the relay client");
            return ExitCode::FAILURE;
        }
    };

    match relay.health().await {
        Ok(health) if health.ok && health.chain_connected => {
            tracing::info!(url = %relay.config().base_url, "relay connected");
        }
        Ok(health) => {
            tracing::warn!(
                url = %relay.config().base_url,
                ok = health.ok,
                chain_connected = health.chain_connected,
                error = health.error.as_deref().unwrap_or("none"),
                "relay reachable but not ready; proofs may not resolve"
            );
        }
        Err(error) => {
            tracing::warn!(%error, "relay health check failed");
        }
    }

    println!(
        "crypt ai on {} ({}). /clear resets, /quit leaves.",
        relay.config().base_url,
        settings.model
    );

    let controller =
        ConversationController::new(relay.clone(), relay, settings.conversation_config());
    match app::run(controller).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "failed to read input");
            ExitCode::FAILURE
        }
    }
}
