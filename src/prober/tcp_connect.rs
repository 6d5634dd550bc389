use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::{Instant, timeout};
use tracing::debug;

use super::{Binding, ProbeResult, Prober};

/// Handshake-only TCP prober. The stream is dropped as soon as it connects.
#[derive(Debug, Default, Clone)]
pub struct TcpProber {
    binding: Option<Binding>,
}

impl TcpProber {
    pub fn new(binding: Option<Binding>) -> Self {
        Self { binding }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: SocketAddr, limit: Duration) -> ProbeResult {
        probe_tcp(target, limit, self.binding.as_ref()).await
    }
}

pub async fn probe_tcp(target: SocketAddr, limit: Duration, binding: Option<&Binding>) -> ProbeResult {
    let start = Instant::now();
    let conn = timeout(limit, connect(target, binding)).await;
    let elapsed = start.elapsed();

    match conn {
        Ok(Ok(stream)) => {
            let source = stream.local_addr().ok();
            drop(stream);
            ProbeResult::success(elapsed, source)
        }
        Ok(Err(e)) => {
            debug!("tcp connect {} failed: {}", target, e);
            ProbeResult::failure(elapsed)
        }
        Err(_) => {
            debug!("tcp connect {} timed out after {:?}", target, limit);
            ProbeResult::failure(elapsed)
        }
    }
}

async fn connect(target: SocketAddr, binding: Option<&Binding>) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(target), Type::STREAM, Some(Protocol::TCP))?;
    if let Some(binding) = binding {
        bind(&socket, binding)?;
    }
    socket.set_nonblocking(true)?;

    let socket = TcpSocket::from_std_stream(socket.into());
    socket.connect(target).await
}

fn bind(socket: &Socket, binding: &Binding) -> io::Result<()> {
    match binding {
        Binding::Source(ip) => socket.bind(&SockAddr::from(SocketAddr::new(*ip, 0))),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        Binding::Device(name) => socket.bind_device(Some(name.as_bytes())),
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        Binding::Device(name) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot bind to interface {name} on this platform"),
        )),
    }
}
