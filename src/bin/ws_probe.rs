//! Diagnostic binary for a LiveSocket endpoint
//!
//! Connects, issues the configured requests with `send_and_listen`, then logs
//! method and event notifications until Ctrl+C or the connection is lost.

use anyhow::{Context, Result};
use crossbeam_channel::{select, Receiver};
use livesocket::{DisconnectReason, EventPacket, MethodPacket, WebSocketClient, WebSocketPacket};
use livesocket_probe::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, ConfigType, ProbeConfig,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = load_config_from_env(ConfigType::from_args(&parse_args(), ConfigType::Probe));
    let config = ProbeConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing_with_level(&config.log_level);
    config.log();

    let client = config.client_builder().build()?;
    let methods = client.subscribe_methods();
    let events = client.subscribe_events();
    let disconnects = client.subscribe_disconnects();

    client.connect(&config.endpoint).await?;
    info!("Connected to {}", config.endpoint);

    if config.is_authenticated() {
        client.set_authenticated(true);
    }

    run_requests(&client, &config).await;

    info!("Listening for notifications, press Ctrl+C to stop");
    let running = Arc::new(AtomicBool::new(true));
    let mut watcher = {
        let running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || log_notifications(methods, events, disconnects, running))
    };

    // The watcher returns on its own once a disconnect is published
    let lost = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received");
            None
        }
        reason = &mut watcher => Some(reason?),
    };

    running.store(false, Ordering::Release);
    client.disconnect().await;
    match lost {
        Some(Some(reason)) => warn!("Connection lost: {}", reason),
        Some(None) => {}
        None => {
            watcher.await?;
        }
    }

    let metrics = client.metrics();
    info!(
        "Shutdown complete: {} sent, {} received, {} parse failures, {} unmatched replies",
        metrics.packets_sent, metrics.packets_received, metrics.parse_failures, metrics.unmatched_replies
    );
    Ok(())
}

async fn run_requests(client: &WebSocketClient, config: &ProbeConfig) {
    for request in &config.requests {
        let mut packet = WebSocketPacket::method(&request.method);
        if !request.arguments.is_null() {
            packet = packet.with_arguments(request.arguments.clone());
        }

        match client.send_and_listen(&mut packet, !request.anonymous).await {
            Ok(Some(reply)) => match reply.check_error() {
                Ok(()) => info!(
                    "{} (id {}) -> {}",
                    request.method,
                    packet.id,
                    reply.payload().cloned().unwrap_or_default()
                ),
                Err(e) => warn!("{} (id {}) failed: {}", request.method, packet.id, e),
            },
            Ok(None) => warn!("{} (id {}) got no reply", request.method, packet.id),
            Err(e) => warn!("{} could not be sent: {}", request.method, e),
        }
    }
}

/// Log notifications until a disconnect arrives or `running` is cleared
fn log_notifications(
    methods: Receiver<MethodPacket>,
    events: Receiver<EventPacket>,
    disconnects: Receiver<DisconnectReason>,
    running: Arc<AtomicBool>,
) -> Option<DisconnectReason> {
    while running.load(Ordering::Acquire) {
        select! {
            recv(methods) -> msg => if let Ok(method) = msg {
                info!("Method {}: {}", method.method, method.parameters);
            },
            recv(events) -> msg => if let Ok(event) = msg {
                info!("Event {}: {}", event.event, event.data);
            },
            recv(disconnects) -> msg => if let Ok(reason) = msg {
                return Some(reason);
            },
            default(Duration::from_millis(200)) => {}
        }
    }
    None
}
