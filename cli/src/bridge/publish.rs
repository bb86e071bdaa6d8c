//! Persistent publishing loop behind `put`.
//!
//! After `put`'s initial exchange the connection is handed to a
//! [`Publisher`] task, which becomes its only owner. The task:
//! - answers every inbound read with the canned reply and reports the
//!   inbound bytes to the listener
//! - executes `putAnswer` exchanges sent through the [`ConnectionHandle`]
//! - exits on I/O failure (reported once), close, or service shutdown,
//!   removing its own registry entry on the way out
//!
//! Close and shutdown interrupt the loop at any await point, including a
//! reply write the peer has stopped draining.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::connection::{Connection, ConnectionCommand, ConnectionHandle};
use crate::constants::ERROR_PREFIX;
use crate::error::{BridgeError, BridgeResult};
use crate::hex;
use crate::listener::BridgeListener;
use crate::registry::ConnectionRegistry;

/// What woke the loop.
enum Wake {
    Cancelled,
    Command(Option<ConnectionCommand>),
    Inbound(BridgeResult<Vec<u8>>),
}

/// Owner of a published connection.
pub(crate) struct Publisher {
    name: String,
    conn: Connection,
    reply: Vec<u8>,
    listener: Arc<dyn BridgeListener>,
    registry: ConnectionRegistry,
    commands: UnboundedReceiver<ConnectionCommand>,
    cancel: CancellationToken,
    answer_timeout: Duration,
}

impl Publisher {
    /// Wrap `conn` for publishing under `name`.
    ///
    /// Returns the publisher (not yet running) and the handle to register.
    pub(crate) fn new(
        name: String,
        conn: Connection,
        reply: Vec<u8>,
        listener: Arc<dyn BridgeListener>,
        registry: ConnectionRegistry,
        cancel: CancellationToken,
        answer_timeout: Duration,
    ) -> (Self, ConnectionHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(
            conn.id(),
            name.clone(),
            conn.endpoint().clone(),
            conn.shared_state(),
            command_tx,
            cancel.clone(),
        );
        let publisher = Self {
            name,
            conn,
            reply,
            listener,
            registry,
            commands,
            cancel,
            answer_timeout,
        };
        (publisher, handle)
    }

    /// Run until the connection fails or is closed.
    pub(crate) async fn run(mut self) {
        log::info!(
            "[Publish] '{}' publishing on {} {} (#{})",
            self.name,
            self.conn.protocol(),
            self.conn.endpoint(),
            self.conn.id()
        );

        match self.serve().await {
            Ok(()) | Err(BridgeError::Cancelled) => {
                log::info!("[Publish] '{}' stopped", self.name);
            }
            Err(e) => {
                log::warn!("[Publish] '{}' terminated: {e}", self.name);
                self.listener
                    .on_error(&format!("{ERROR_PREFIX}publishing '{}' terminated: {e}", self.name));
            }
        }

        self.registry.remove_if(&self.name, self.conn.id()).await;
        self.conn.close().await;
        // Marks the handle as no longer live and wakes anyone awaiting `closed()`.
        self.cancel.cancel();
    }

    async fn serve(&mut self) -> BridgeResult<()> {
        loop {
            let wake = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Wake::Cancelled,
                command = self.commands.recv() => Wake::Command(command),
                inbound = self.conn.receive() => Wake::Inbound(inbound),
            };

            match wake {
                Wake::Cancelled | Wake::Command(None) => return Ok(()),
                Wake::Command(Some(ConnectionCommand::Exchange {
                    payload,
                    respond_to,
                })) => {
                    let result = self.exchange(&payload).await;
                    let fatal = match &result {
                        Err(BridgeError::Timeout) | Ok(_) => None,
                        Err(e) => Some(e.clone()),
                    };
                    if respond_to.send(result).is_err() {
                        log::debug!("[Publish] '{}' answer caller went away", self.name);
                    }
                    if let Some(e) = fatal {
                        return Err(e);
                    }
                }
                Wake::Inbound(inbound) => {
                    let data = inbound?;
                    let data_hex = hex::encode(&data);
                    log::debug!("[Publish] '{}' received {}", self.name, data_hex);
                    cancellable(&self.cancel, self.conn.send(&self.reply)).await?;
                    log::debug!("[Publish] '{}' sent canned reply", self.name);
                    self.listener.on_received_interest(&data_hex, &self.name);
                }
            }
        }
    }

    /// Write `payload` and report the next bounded read.
    ///
    /// A reply that misses the deadline fails only this exchange; the
    /// connection stays up.
    async fn exchange(&mut self, payload: &[u8]) -> BridgeResult<Vec<u8>> {
        cancellable(&self.cancel, self.conn.send(payload)).await?;
        let conn = &mut self.conn;
        let answer_timeout = self.answer_timeout;
        let read = async move {
            match tokio::time::timeout(answer_timeout, conn.receive()).await {
                Ok(received) => received,
                Err(_elapsed) => Err(BridgeError::Timeout),
            }
        };
        let data = cancellable(&self.cancel, read).await?;
        self.listener
            .on_received_interest(&hex::encode(&data), &self.name);
        Ok(data)
    }
}

/// Run `io` unless `cancel` fires first, in which case the I/O is dropped
/// mid-flight and [`BridgeError::Cancelled`] is returned.
async fn cancellable<T>(
    cancel: &CancellationToken,
    io: impl Future<Output = BridgeResult<T>>,
) -> BridgeResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BridgeError::Cancelled),
        result = io => result,
    }
}
