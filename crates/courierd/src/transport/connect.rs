//! Outbound connections with a deadline.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use socket2::{Domain, SockAddr, Socket, Type};

use courier_config::SocketEndpoint;

use super::{ConnectError, ConnectionStream};

/// Opens a stream to `endpoint`, giving up once `timeout` elapses.
pub(crate) fn connect(
    endpoint: &SocketEndpoint,
    timeout: Duration,
) -> Result<ConnectionStream, ConnectError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port).map_err(|source| {
                ConnectError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;
            let stream = TcpStream::connect_timeout(&address, timeout).map_err(|source| {
                ConnectError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;
            // Frames are small and latency-bound.
            stream
                .set_nodelay(true)
                .map_err(|source| ConnectError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
            Ok(ConnectionStream::Tcp(stream))
        }
        SocketEndpoint::Unix { path } => connect_unix(path.as_str(), timeout)
            .map(ConnectionStream::Unix)
            .map_err(|source| ConnectError::Connect {
                endpoint: endpoint.to_string(),
                source,
            }),
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

fn connect_unix(path: &str, timeout: Duration) -> io::Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    Ok(UnixStream::from(std::os::fd::OwnedFd::from(socket)))
}
