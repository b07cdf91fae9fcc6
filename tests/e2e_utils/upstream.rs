use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// A destination the proxy can dial.
pub struct Upstream {
    listener: TcpListener,
}

impl Upstream {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind upstream");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("upstream has no address")
    }

    pub async fn accept(&self) -> TcpStream {
        let (stream, _) = timeout(IO_TIMEOUT, self.listener.accept())
            .await
            .expect("Proxy should dial the upstream within timeout")
            .expect("Upstream accept failed");
        stream
    }

    /// True if nobody connects within `wait`.
    pub async fn stays_idle(&self, wait: Duration) -> bool {
        timeout(wait, self.listener.accept()).await.is_err()
    }

    /// Accepts connections forever and echoes everything back.
    pub fn spawn_echo(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = self.listener.accept().await {
                tokio::spawn(async move {
                    let (mut read, mut write) = stream.split();
                    let _ = tokio::io::copy(&mut read, &mut write).await;
                });
            }
        })
    }
}

/// A listening port whose accept queue is full and never drained, so new
/// dials get no answer to their SYN.
pub struct Blackhole {
    listener: std::net::TcpListener,
    _queued: Vec<TcpStream>,
}

impl Blackhole {
    pub async fn bind() -> Self {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).expect("Failed to create socket");
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid address");
        socket.bind(&addr.into()).expect("Failed to bind blackhole");
        socket.listen(0).expect("Failed to listen");
        let listener: std::net::TcpListener = socket.into();
        let addr = listener.local_addr().expect("blackhole has no address");

        let mut queued = Vec::new();
        loop {
            assert!(queued.len() < 16, "accept queue never filled up");
            match timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => queued.push(stream),
                _ => break,
            }
        }

        Self {
            listener,
            _queued: queued,
        }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().expect("blackhole has no address").port()
    }
}

/// A port on which nothing listens.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    listener.local_addr().expect("no address").port()
}

/// Reads until the peer closes, bounded by a timeout.
pub async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    timeout(IO_TIMEOUT, stream.read_to_end(&mut received))
        .await
        .expect("Proxy should close the connection within timeout")
        .expect("Should be able to read the reply");
    received
}

/// Reads exactly `len` bytes, bounded by a timeout.
pub async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(IO_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("Should receive data within timeout")
        .expect("Should be able to read data");
    buf
}
