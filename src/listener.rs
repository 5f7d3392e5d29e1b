use std::io;
use std::net::{SocketAddr, TcpListener};

/// Binds the HTTP listener.
///
/// With `reuse_port` every worker process binds its own socket to the same
/// address and the kernel spreads incoming connections across them.
pub fn bind_listener(addr: SocketAddr, reuse_port: bool) -> io::Result<TcpListener> {
    let listener = if reuse_port {
        bind_shared(addr)?
    } else {
        TcpListener::bind(addr)?
    };
    listener.set_nonblocking(true)?;
    Ok(listener)
}

#[cfg(unix)]
fn bind_shared(addr: SocketAddr) -> io::Result<TcpListener> {
    use std::os::fd::AsRawFd;

    use nix::sys::socket::{
        bind, listen, setsockopt, socket, sockopt, AddressFamily, Backlog, SockFlag, SockType,
        SockaddrStorage,
    };

    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };

    let fd = socket(family, SockType::Stream, SockFlag::empty(), None)?;
    setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    setsockopt(&fd, sockopt::ReusePort, &true)?;
    bind(fd.as_raw_fd(), &SockaddrStorage::from(addr))?;
    listen(&fd, Backlog::MAXCONN)?;

    Ok(TcpListener::from(fd))
}

#[cfg(not(unix))]
fn bind_shared(addr: SocketAddr) -> io::Result<TcpListener> {
    log::warn!("SO_REUSEPORT is not available on this platform, binding exclusively");
    TcpListener::bind(addr)
}
