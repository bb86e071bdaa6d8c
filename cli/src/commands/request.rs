//! One-shot bridge commands.
//!
//! Each command builds a [`BridgeService`], runs a single operation, and
//! prints its result to stdout. `publish` keeps running, printing listener
//! events as JSON lines, until interrupted.
//!
//! # Examples
//!
//! ```bash
//! # TCP request/response with a 1500ms deadline
//! socket-bridge get --host localhost --port 9695 --request 01d2f2fa --timeout-ms 1500
//!
//! # Single UDP datagram exchange
//! socket-bridge udp --host localhost --port 6363 --request 01d2f2fa
//!
//! # Publish under a name, answering every inbound read with a canned reply
//! socket-bridge publish --host localhost --port 9695 --request 01d2 --name alice --reply 0482
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::bridge::{BridgeService, PutResponse};
use crate::config::Config;
use crate::listener::{BridgeEvent, ChannelListener, LogListener};

/// Run `get` and print the hex response or sentinel.
pub fn get(config: Config, host: &str, port: u16, request_hex: &str, timeout_ms: Option<u64>) -> Result<()> {
    let timeout = timeout_ms.map_or_else(|| config.default_get_timeout(), Duration::from_millis);
    let rt = super::runtime()?;
    let response = rt.block_on(async {
        let service = BridgeService::new(config, Arc::new(LogListener));
        service.get(host, port, request_hex, timeout).await
    });
    println!("{response}");
    Ok(())
}

/// Run `connectAndStart` and print the hex reply (empty line if none).
pub fn udp(config: Config, host: &str, port: u16, request_hex: &str) -> Result<()> {
    let rt = super::runtime()?;
    let response = rt.block_on(async {
        let service = BridgeService::new(config, Arc::new(LogListener));
        service.connect_and_start(host, port, request_hex).await
    });
    println!("{response}");
    Ok(())
}

/// Run `put`, then print listener events until Ctrl-C or the publisher ends.
pub fn publish(
    config: Config,
    host: &str,
    port: u16,
    request_hex: &str,
    name: &str,
    reply_hex: &str,
) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(async {
        let (listener, mut events) = ChannelListener::new();
        let service = BridgeService::new(config, Arc::new(listener));

        let response = service.put(host, port, request_hex, name, reply_hex).await;
        println!("{response}");
        if response == PutResponse::Failure {
            print_pending(&mut events)?;
            anyhow::bail!("publishing '{name}' failed to start");
        }

        let publisher = match service.registry().lookup(name).await {
            Ok(handle) => handle,
            Err(_) => {
                // Ended between start and lookup; its error event is queued.
                print_pending(&mut events)?;
                log::info!("Publisher '{name}' ended");
                service.shutdown().await;
                return Ok(());
            }
        };

        let closed = publisher.closed();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(closed);
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    println!("{}", serde_json::to_string(&event)?);
                }
                () = &mut closed => {
                    print_pending(&mut events)?;
                    log::info!("Publisher '{name}' ended");
                    break;
                }
                _ = &mut ctrl_c => {
                    log::info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        service.shutdown().await;
        Ok::<(), anyhow::Error>(())
    })
}

/// Print events already queued, as JSON lines.
fn print_pending(events: &mut UnboundedReceiver<BridgeEvent>) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
