//! The bridge service: public socket operations over hex payloads.
//!
//! [`BridgeService`] turns caller requests into raw socket I/O and back into
//! hex-encoded results, delivered either as a return value or pushed to the
//! [`BridgeListener`].
//!
//! # Operations
//!
//! | Operation | Transport | Result | Runs on |
//! |-----------|-----------|--------|---------|
//! | [`get`](BridgeService::get) | TCP | hex / `TIMEOUT EXPIRED` / `ERROR` | timed task |
//! | [`put`](BridgeService::put) | TCP | `STARTED PUBLISHING` / `FAILURE` | timed task, then publisher task |
//! | [`put_answer`](BridgeService::put_answer) | named TCP | `SUCCESS` / `FAILURE` | connection's publisher task |
//! | [`connect_and_start`](BridgeService::connect_and_start) | UDP | hex / `""` | caller |
//! | [`query`](BridgeService::query) | UDP, default route | hex / `""` | caller |
//!
//! Failures never escape as `Err`: they are reported through
//! [`BridgeListener::on_error`] and mapped to the sentinel result.
//!
//! # Lifecycle
//!
//! The service owns its [`ConnectionRegistry`] and a shutdown token.
//! [`shutdown`](BridgeService::shutdown) stops every timed operation and
//! publisher, and empties the registry.

pub mod publish;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::{Connection, Endpoint, Protocol};
use crate::constants::ERROR_PREFIX;
use crate::error::{BridgeError, BridgeResult};
use crate::executor::TimedExecutor;
use crate::hex;
use crate::listener::BridgeListener;
use crate::registry::ConnectionRegistry;

use publish::Publisher;
pub use response::{AnswerResponse, GetResponse, PutResponse};

/// Socket bridge service.
pub struct BridgeService {
    config: Config,
    listener: Arc<dyn BridgeListener>,
    registry: ConnectionRegistry,
    executor: TimedExecutor,
    shutdown: CancellationToken,
    route: RwLock<Option<Endpoint>>,
}

impl std::fmt::Debug for BridgeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeService")
            .field("config", &self.config)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl BridgeService {
    /// Creates the service and signals `on_ready` to the listener.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: Config, listener: Arc<dyn BridgeListener>) -> Self {
        let shutdown = CancellationToken::new();
        let route = config.route.clone();
        let service = Self {
            executor: TimedExecutor::new(shutdown.child_token()),
            config,
            listener,
            registry: ConnectionRegistry::new(),
            shutdown,
            route: RwLock::new(route),
        };
        log::info!("[Bridge] Ready");
        service.listener.on_ready();
        service
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry of named connections.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Open a TCP or UDP connection.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] if the host refuses, is unreachable,
    /// or does not answer within the configured connect timeout.
    pub async fn open(&self, host: &str, port: u16, protocol: Protocol) -> BridgeResult<Connection> {
        Connection::open(
            Endpoint::new(host, port),
            protocol,
            self.config.connect_timeout(),
            self.config.read_buffer_size,
        )
        .await
    }

    /// Send `request_hex` over a fresh TCP connection and return the hex of
    /// one bounded response read.
    ///
    /// The whole exchange, connect included, is bounded by `timeout`. The
    /// connection is closed afterwards in every case.
    pub async fn get(&self, host: &str, port: u16, request_hex: &str, timeout: Duration) -> GetResponse {
        match self.try_get(host, port, request_hex, timeout).await {
            Ok(data) => GetResponse::Data(hex::encode(&data)),
            Err(e) => {
                self.report_error("get", &e);
                match e {
                    BridgeError::Timeout => GetResponse::TimeoutExpired,
                    _ => GetResponse::Error,
                }
            }
        }
    }

    async fn try_get(
        &self,
        host: &str,
        port: u16,
        request_hex: &str,
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>> {
        let payload = hex::decode(request_hex)?;
        let endpoint = Endpoint::new(host, port);
        let connect_timeout = self.config.connect_timeout();
        let read_buffer_size = self.config.read_buffer_size;
        log::debug!("[Bridge] get {} <- {}", endpoint, request_hex);

        let label = format!("get {endpoint}");
        self.executor
            .run_with_deadline(label, timeout, async move {
                let mut conn =
                    Connection::open(endpoint, Protocol::Tcp, connect_timeout, read_buffer_size)
                        .await?;
                let result = match conn.send(&payload).await {
                    Ok(()) => conn.receive().await,
                    Err(e) => Err(e),
                };
                conn.close().await;
                result
            })
            .await
    }

    /// Start publishing on a TCP connection registered as `name`.
    ///
    /// Sends `request_hex`, consumes one reply, then hands the connection to
    /// a background loop that answers each inbound read with `reply_hex` and
    /// reports the inbound bytes through `on_received_interest`. Returns once
    /// the loop is registered; the loop's data never flows back here.
    pub async fn put(
        &self,
        host: &str,
        port: u16,
        request_hex: &str,
        name: &str,
        reply_hex: &str,
    ) -> PutResponse {
        match self.try_put(host, port, request_hex, name, reply_hex).await {
            Ok(()) => PutResponse::StartedPublishing,
            Err(e) => {
                self.report_error("put", &e);
                PutResponse::Failure
            }
        }
    }

    async fn try_put(
        &self,
        host: &str,
        port: u16,
        request_hex: &str,
        name: &str,
        reply_hex: &str,
    ) -> BridgeResult<()> {
        let payload = hex::decode(request_hex)?;
        let reply = hex::decode(reply_hex)?;
        let endpoint = Endpoint::new(host, port);
        let connect_timeout = self.config.connect_timeout();
        let read_buffer_size = self.config.read_buffer_size;

        let label = format!("put {name} {endpoint}");
        let conn = self
            .executor
            .run_with_deadline(label, self.config.exchange_timeout(), async move {
                let mut conn =
                    Connection::open(endpoint, Protocol::Tcp, connect_timeout, read_buffer_size)
                        .await?;
                conn.send(&payload).await?;
                let first = conn.receive().await?;
                log::debug!("[Bridge] put initial reply: {}", hex::encode(&first));
                Ok(conn)
            })
            .await?;

        let (publisher, handle) = Publisher::new(
            name.to_string(),
            conn,
            reply,
            Arc::clone(&self.listener),
            self.registry.clone(),
            self.shutdown.child_token(),
            self.config.exchange_timeout(),
        );
        // Register before the loop runs so a fast exit cannot leave a stale entry.
        self.registry.register(name, handle).await;
        tokio::spawn(publisher.run());
        Ok(())
    }

    /// Write `reply_hex` to the connection registered as `name` and report
    /// the next response through `on_received_interest`.
    pub async fn put_answer(&self, name: &str, reply_hex: &str) -> AnswerResponse {
        match self.try_put_answer(name, reply_hex).await {
            Ok(()) => AnswerResponse::Success,
            Err(e) => {
                self.report_error("putAnswer", &e);
                AnswerResponse::Failure
            }
        }
    }

    async fn try_put_answer(&self, name: &str, reply_hex: &str) -> BridgeResult<()> {
        let payload = hex::decode(reply_hex)?;
        let handle = self.registry.lookup(name).await?;
        if !handle.is_live() {
            return Err(BridgeError::Io(format!("connection '{name}' is closing")));
        }
        let data = handle.exchange(payload).await?;
        log::debug!("[Bridge] putAnswer '{}' got {} bytes", name, data.len());
        Ok(())
    }

    /// Send one UDP datagram and return the hex of the first reply datagram,
    /// or `""` if none arrives within the UDP receive timeout.
    pub async fn connect_and_start(&self, host: &str, port: u16, request_hex: &str) -> String {
        match self.try_connect_and_start(host, port, request_hex).await {
            Ok(data) => hex::encode(&data),
            Err(e) => {
                self.report_error("connectAndStart", &e);
                String::new()
            }
        }
    }

    async fn try_connect_and_start(
        &self,
        host: &str,
        port: u16,
        request_hex: &str,
    ) -> BridgeResult<Vec<u8>> {
        let payload = hex::decode(request_hex)?;
        let mut conn = self.open(host, port, Protocol::Udp).await?;
        conn.send(&payload).await?;
        let result =
            match tokio::time::timeout(self.config.udp_receive_timeout(), conn.receive()).await {
                Ok(received) => received,
                Err(_elapsed) => Err(BridgeError::Timeout),
            };
        conn.close().await;
        result
    }

    /// Set the default route used by [`query`](Self::query).
    pub async fn set_route(&self, host: &str, port: u16) {
        let endpoint = Endpoint::new(host, port);
        log::info!("[Bridge] Default route set to {}", endpoint);
        *self.route.write().await = Some(endpoint);
    }

    /// Current default route.
    pub async fn route(&self) -> Option<Endpoint> {
        self.route.read().await.clone()
    }

    /// [`connect_and_start`](Self::connect_and_start) against the default
    /// route. Returns `""` and reports an error when no route is set.
    pub async fn query(&self, request_hex: &str) -> String {
        match self.route().await {
            Some(route) => self.connect_and_start(&route.host, route.port, request_hex).await,
            None => {
                self.report_error("query", &BridgeError::NoRoute);
                String::new()
            }
        }
    }

    /// Close the connection registered as `name`.
    ///
    /// Returns `false` if nothing was registered under that name.
    pub async fn close(&self, name: &str) -> bool {
        match self.registry.remove(name).await {
            Some(handle) => {
                log::info!("[Bridge] Closing '{}' (#{})", name, handle.id());
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Stop all operations and publishers and empty the registry.
    pub async fn shutdown(&self) {
        log::info!("[Bridge] Shutting down");
        self.shutdown.cancel();
        for handle in self.registry.drain().await {
            handle.close();
        }
    }

    fn report_error(&self, operation: &str, err: &BridgeError) {
        log::warn!("[Bridge] {operation} failed: {err}");
        self.listener
            .on_error(&format!("{ERROR_PREFIX}{operation}: {err}"));
    }
}

impl Drop for BridgeService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
