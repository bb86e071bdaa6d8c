//! Live transport endpoints and the handles used to address them.
//!
//! A [`Connection`] owns one TCP stream or connected UDP socket and performs
//! the bridge's bounded I/O on it. Exactly one task owns a `Connection` at a
//! time; other parties reach a named connection through a cloneable
//! [`ConnectionHandle`], whose commands are executed by the owning task so
//! reads and writes on the socket stay strictly sequential.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, BridgeResult};

/// Transport protocol of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Stream socket.
    Tcp,
    /// Datagram socket, connected to a single peer.
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

/// Remote host and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP literal.
    pub host: String,
    /// Remote port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = BridgeError;

    /// Parses `host:port`, splitting on the last colon.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| BridgeError::MalformedInput(format!("expected host:port, got '{s}'")))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| BridgeError::MalformedInput(format!("invalid port '{port}': {e}")))?;
        if host.is_empty() {
            return Err(BridgeError::MalformedInput(format!("missing host in '{s}'")));
        }
        Ok(Self::new(host, port))
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Establishing the transport.
    Connecting = 0,
    /// Ready for reads and writes.
    Open = 1,
    /// Closed locally or by service teardown.
    Closed = 2,
    /// Connect or I/O failed.
    Failed = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closed,
            _ => ConnectionState::Failed,
        }
    }
}

/// Allocate a process-unique connection id.
fn next_connection_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
enum Transport {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// A live transport endpoint.
///
/// Dropping a `Connection` closes its socket, which is what stops any peer
/// still waiting on it.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    protocol: Protocol,
    endpoint: Endpoint,
    state: Arc<AtomicU8>,
    transport: Transport,
    read_buffer_size: usize,
}

impl Connection {
    /// Open a TCP or UDP connection to `endpoint`.
    ///
    /// The whole establishment (resolution included) is bounded by
    /// `connect_timeout`. For UDP the socket is bound to an ephemeral local
    /// port of the peer's address family and connected to the peer.
    pub async fn open(
        endpoint: Endpoint,
        protocol: Protocol,
        connect_timeout: Duration,
        read_buffer_size: usize,
    ) -> BridgeResult<Self> {
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting as u8));

        let establish = async {
            match protocol {
                Protocol::Tcp => TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                    .await
                    .map(Transport::Tcp),
                Protocol::Udp => Self::connect_udp(&endpoint).await.map(Transport::Udp),
            }
        };

        let transport = match tokio::time::timeout(connect_timeout, establish).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                state.store(ConnectionState::Failed as u8, Ordering::Relaxed);
                return Err(BridgeError::Connect(format!("{protocol} {endpoint}: {e}")));
            }
            Err(_elapsed) => {
                state.store(ConnectionState::Failed as u8, Ordering::Relaxed);
                return Err(BridgeError::Connect(format!(
                    "{protocol} {endpoint}: no connection within {}ms",
                    connect_timeout.as_millis()
                )));
            }
        };

        state.store(ConnectionState::Open as u8, Ordering::Relaxed);
        let id = next_connection_id();
        log::debug!("[Connection] #{id} connected to {protocol} {endpoint}");

        Ok(Self {
            id,
            protocol,
            endpoint,
            state,
            transport,
            read_buffer_size: read_buffer_size.max(1),
        })
    }

    async fn connect_udp(endpoint: &Endpoint) -> std::io::Result<UdpSocket> {
        let peer: SocketAddr = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no address")
            })?;
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(socket)
    }

    /// Write the whole payload (one datagram for UDP).
    pub async fn send(&mut self, payload: &[u8]) -> BridgeResult<()> {
        let result = match &mut self.transport {
            Transport::Tcp(stream) => stream.write_all(payload).await.map_err(BridgeError::from),
            Transport::Udp(socket) => match socket.send(payload).await {
                Ok(sent) if sent == payload.len() => Ok(()),
                Ok(sent) => Err(BridgeError::Io(format!(
                    "datagram truncated: sent {sent} of {} bytes",
                    payload.len()
                ))),
                Err(e) => Err(e.into()),
            },
        };
        self.track(result)
    }

    /// Take one bounded read of at most `read_buffer_size` bytes.
    ///
    /// Returns only the bytes actually received. End-of-stream is an error.
    /// Cancel-safe: dropping the future before completion loses no data.
    pub async fn receive(&mut self) -> BridgeResult<Vec<u8>> {
        let mut buf = vec![0u8; self.read_buffer_size];
        let result = match &mut self.transport {
            Transport::Tcp(stream) => match stream.read(&mut buf).await {
                Ok(0) => Err(BridgeError::Io("connection closed by remote".to_string())),
                Ok(n) => Ok(n),
                Err(e) => Err(e.into()),
            },
            Transport::Udp(socket) => socket.recv(&mut buf).await.map_err(BridgeError::from),
        };
        let n = self.track(result)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Close the connection, flushing a TCP FIN to the peer.
    pub async fn close(mut self) {
        if let Transport::Tcp(stream) = &mut self.transport {
            if let Err(e) = stream.shutdown().await {
                log::debug!("[Connection] #{} shutdown error: {e}", self.id);
            }
        }
        self.mark(ConnectionState::Closed);
        log::debug!("[Connection] #{} closed", self.id);
    }

    fn track<T>(&self, result: BridgeResult<T>) -> BridgeResult<T> {
        if result.is_err() {
            self.mark(ConnectionState::Failed);
        }
        result
    }

    fn mark(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Remote endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn shared_state(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.state)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Socket closes with the transport; record it unless already final.
        let _ = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closed as u8,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}

/// Work delivered to the task that owns a named connection.
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Write `payload`, then take one bounded read and report it.
    Exchange {
        payload: Vec<u8>,
        respond_to: oneshot::Sender<BridgeResult<Vec<u8>>>,
    },
}

/// Cloneable reference to a named connection owned by a background task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    name: String,
    endpoint: Endpoint,
    state: Arc<AtomicU8>,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: u64,
        name: String,
        endpoint: Endpoint,
        state: Arc<AtomicU8>,
        command_tx: mpsc::UnboundedSender<ConnectionCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            endpoint,
            state,
            command_tx,
            cancel,
        }
    }

    /// Id of the underlying connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name the connection is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current lifecycle state of the underlying connection.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Relaxed))
    }

    /// Whether the owning task is still serving this connection.
    ///
    /// Turns false as soon as a close is requested or the task exits.
    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
            && !self.command_tx.is_closed()
            && self.state() == ConnectionState::Open
    }

    /// Write `payload` and wait for one bounded reply read.
    ///
    /// The owning task performs the I/O, so this never races the task's own
    /// reads.
    pub async fn exchange(&self, payload: Vec<u8>) -> BridgeResult<Vec<u8>> {
        let (respond_to, response) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Exchange {
                payload,
                respond_to,
            })
            .map_err(|e| {
                log::debug!("[Connection] #{} command channel closed: {e}", self.id);
                BridgeError::Io(format!("connection '{}' is closed", self.name))
            })?;
        response.await.map_err(|e| {
            log::debug!("[Connection] #{} dropped exchange: {e}", self.id);
            BridgeError::Io(format!("connection '{}' closed during exchange", self.name))
        })?
    }

    /// Ask the owning task to close the connection.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the connection has been asked to close or its owning
    /// task has exited.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_endpoint_parse() {
        let ep: Endpoint = "localhost:9695".parse().unwrap();
        assert_eq!(ep, Endpoint::new("localhost", 9695));
        assert_eq!(ep.to_string(), "localhost:9695");

        let v6: Endpoint = "::1:6363".parse().unwrap();
        assert_eq!(v6.host, "::1");

        assert!("nohost".parse::<Endpoint>().is_err());
        assert!(":80".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(ConnectionState::from(1), ConnectionState::Open);
        assert_eq!(ConnectionState::from(200), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_tcp_send_and_bounded_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"abc");
            stream.write_all(&[7u8; 10]).await.unwrap();
            // Hold the stream open until the client is done.
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });

        let mut conn = Connection::open(Endpoint::new("127.0.0.1", port), Protocol::Tcp, TIMEOUT, 4)
            .await
            .unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.protocol(), Protocol::Tcp);

        conn.send(b"abc").await.unwrap();
        let first = conn.receive().await.unwrap();
        assert_eq!(first, vec![7u8; 4], "read must be bounded by the buffer size");

        let state = conn.shared_state();
        conn.close().await;
        assert_eq!(ConnectionState::from(state.load(Ordering::Relaxed)), ConnectionState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connect_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Connection::open(Endpoint::new("127.0.0.1", port), Protocol::Tcp, TIMEOUT, 16).await;
        assert!(matches!(result, Err(BridgeError::Connect(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn test_remote_close_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut conn = Connection::open(Endpoint::new("127.0.0.1", port), Protocol::Tcp, TIMEOUT, 16)
            .await
            .unwrap();
        server.await.unwrap();

        let err = conn.receive().await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_udp_datagram_exchange() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let mut conn = Connection::open(Endpoint::new("127.0.0.1", port), Protocol::Udp, TIMEOUT, 64)
            .await
            .unwrap();
        assert_eq!(conn.protocol(), Protocol::Udp);
        conn.send(&[1, 2, 3]).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        peer.send_to(&[9, 8], from).await.unwrap();

        assert_eq!(conn.receive().await.unwrap(), vec![9, 8]);
    }

    #[tokio::test]
    async fn test_drop_marks_open_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let conn = Connection::open(Endpoint::new("127.0.0.1", port), Protocol::Tcp, TIMEOUT, 16)
            .await
            .unwrap();
        let state = conn.shared_state();
        drop(conn);
        assert_eq!(ConnectionState::from(state.load(Ordering::Relaxed)), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_handle_liveness_follows_close() {
        let (command_tx, mut commands) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(
            7,
            "alice".to_string(),
            Endpoint::new("127.0.0.1", 9695),
            Arc::new(AtomicU8::new(ConnectionState::Open as u8)),
            command_tx,
            CancellationToken::new(),
        );
        assert!(handle.is_live());

        let waiter = handle.clone();
        let closed = tokio::spawn(async move { waiter.closed().await });
        handle.close();
        tokio::time::timeout(TIMEOUT, closed).await.unwrap().unwrap();
        assert!(!handle.is_live());

        commands.close();
        assert!(handle.exchange(vec![1]).await.is_err());
    }

    #[test]
    fn test_handle_not_live_once_connection_failed() {
        let (command_tx, _commands) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ConnectionState::Open as u8));
        let handle = ConnectionHandle::new(
            8,
            "bob".to_string(),
            Endpoint::new("127.0.0.1", 9695),
            Arc::clone(&state),
            command_tx,
            CancellationToken::new(),
        );
        state.store(ConnectionState::Failed as u8, Ordering::Relaxed);
        assert!(!handle.is_live());
        assert_eq!(handle.state(), ConnectionState::Failed);
    }
}
