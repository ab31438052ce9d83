//! `SO_REUSEPORT` fan-out: one reactor thread per listener, all bound to the
//! same address so the kernel load-balances accepted connections across
//! them (§4.I "Fan-out").

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};

use super::Reactor;
use crate::config::Config;
use crate::router::Router;

fn reuse_port_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(not(windows))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener))
}

/// Spawns `worker_count` reactor threads, each with its own `SO_REUSEPORT`
/// listener on `addr` sharing one [`Router`]/[`Config`]. Returns the join
/// handles; the caller is responsible for signaling shutdown (e.g. via
/// [`super::ReactorHandle::post_update`]) and joining them.
pub fn spawn_fanout(
    addr: SocketAddr,
    worker_count: usize,
    router: Arc<Router>,
    config: Config,
) -> io::Result<Vec<JoinHandle<io::Result<()>>>> {
    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let listener = reuse_port_listener(addr)?;
        let router = router.clone();
        let config = config.clone();
        handles.push(std::thread::spawn(move || {
            let mut reactor = Reactor::from_listener(listener, router, config)?;
            reactor.run()
        }));
    }
    Ok(handles)
}
