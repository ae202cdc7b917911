//! Server lifecycle: binding, readiness, shutdown.
//!
//! [`HttpServer`] carries the service together with its [`RuntimeConfig`];
//! starting it sizes the coroutine stacks and hands back a
//! [`ServerHandle`] bound to the resolved address.

use crate::runtime_config::RuntimeConfig;
use may::coroutine::JoinHandle;
use may_minihttp::{HttpServer as MiniHttpServer, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

/// A service paired with the runtime settings it will be served under.
pub struct HttpServer<T> {
    service: T,
    runtime: RuntimeConfig,
}

/// Handle to a running server: the bound address plus the accept-loop
/// coroutine.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Wrap a service with the runtime configuration from the environment
    /// (`WAYMARK_STACK_SIZE`).
    pub fn new(service: T) -> Self {
        Self {
            service,
            runtime: RuntimeConfig::from_env(),
        }
    }

    /// Override the runtime configuration.
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Bind `addr` and start serving.
    ///
    /// The stack size applies to the `may` scheduler process-wide, so it
    /// takes effect for coroutines spawned after this call.
    ///
    /// # Errors
    ///
    /// Fails when the address does not resolve or the port cannot be
    /// bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        may::config().set_stack_size(self.runtime.stack_size);
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve"))?;
        let handle = MiniHttpServer(self.service).start(addr)?;
        Ok(ServerHandle { addr, handle })
    }
}

impl ServerHandle {
    /// The address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the listener accepts connections, up to a short
    /// deadline. The accept loop runs on a coroutine, so the bind can
    /// still be in flight when `start` returns.
    pub fn wait_ready(&self) -> io::Result<()> {
        let deadline = Instant::now() + Duration::from_millis(500);
        loop {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("server on {} did not become ready", self.addr),
                ));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Tear the server down and wait for the accept loop to exit.
    ///
    /// `may` has no graceful-shutdown signal; cancelling the accept
    /// coroutine is the supported way to stop listening. In-flight request
    /// coroutines run to completion on their own.
    pub fn stop(self) {
        unsafe { self.handle.coroutine().cancel() };
        let _ = self.handle.join();
    }

    /// Run until the accept loop exits on its own.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}
