use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Request written on every probe
pub const PING: &[u8] = b"PING\r\n";

/// Expected acknowledgement; only the first [`PONG_PREFIX_LEN`] bytes are compared
pub const PONG: &[u8] = b"+PONG\r\n";

pub const PONG_PREFIX_LEN: usize = 5;

const READ_BUFFER_SIZE: usize = 1024;

/// Why a probe did not count as a success
#[derive(Debug)]
pub enum ProbeFailure {
    Connect(io::Error),
    ConnectTimeout,
    Write(io::Error),
    Read(io::Error),
    /// No reply within the pong timeout
    Timeout,
    /// The worker closed the connection
    Closed,
    /// A reply arrived but was not a pong
    Mismatch(Vec<u8>),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::Connect(e) => write!(f, "connect failed: {}", e),
            ProbeFailure::ConnectTimeout => write!(f, "connect timed out"),
            ProbeFailure::Write(e) => write!(f, "write failed: {}", e),
            ProbeFailure::Read(e) => write!(f, "read failed: {}", e),
            ProbeFailure::Timeout => write!(f, "no reply in time"),
            ProbeFailure::Closed => write!(f, "connection closed by worker"),
            ProbeFailure::Mismatch(reply) => {
                write!(f, "unexpected reply {:?}", String::from_utf8_lossy(reply))
            }
        }
    }
}

/// Result of one ping round-trip
#[derive(Debug)]
pub enum ProbeOutcome {
    Pong { rtt: Duration },
    Failed(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Pong { .. })
    }
}

/// Speaks the worker's line-based ping protocol over a persistent connection
///
/// The connection is opened lazily and reused across probes. Transport-level
/// failures close it; a protocol mismatch leaves it open.
pub struct HealthProbe {
    addr: SocketAddr,
    pong_timeout: Duration,
    connect_timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl HealthProbe {
    pub fn new(addr: SocketAddr, pong_timeout: Duration, connect_timeout: Option<Duration>) -> Self {
        Self {
            addr,
            pong_timeout,
            connect_timeout,
            stream: None,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the health-check connection if open
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    /// Perform one probe
    ///
    /// The only unbounded wait is the TCP connect when no connect timeout is
    /// configured; the reply wait is always bounded by the pong timeout.
    pub async fn probe(&mut self) -> ProbeOutcome {
        match self.exchange().await {
            Ok(rtt) => ProbeOutcome::Pong { rtt },
            Err(failure) => {
                if !matches!(failure, ProbeFailure::Mismatch(_)) {
                    self.stream = None;
                }
                ProbeOutcome::Failed(failure)
            }
        }
    }

    async fn exchange(&mut self) -> Result<Duration, ProbeFailure> {
        if self.stream.is_none() {
            self.stream = Some(self.connect().await?);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ProbeFailure::Closed);
        };

        let started = Instant::now();
        stream.write_all(PING).await.map_err(ProbeFailure::Write)?;

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let n = tokio::time::timeout(self.pong_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| ProbeFailure::Timeout)?
            .map_err(ProbeFailure::Read)?;
        let rtt = started.elapsed();

        if n == 0 {
            return Err(ProbeFailure::Closed);
        }

        let reply = &buf[..n];
        if reply.len() < PONG_PREFIX_LEN || reply[..PONG_PREFIX_LEN] != PONG[..PONG_PREFIX_LEN] {
            return Err(ProbeFailure::Mismatch(reply.to_vec()));
        }

        Ok(rtt)
    }

    async fn connect(&self) -> Result<TcpStream, ProbeFailure> {
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(self.addr))
                .await
                .map_err(|_| ProbeFailure::ConnectTimeout)?,
            None => TcpStream::connect(self.addr).await,
        }
        .map_err(ProbeFailure::Connect)?;

        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}
