use super::{Close, CloseHandle, MessageRx, MessageTx};
use crate::config::{Endpoint, Endpoints, Role};
use crate::error::TransportError;
use std::fs;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Messages are length-prefixed on the stream; anything claiming more than this is treated
/// as a corrupt stream.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// An endpoint with its host name looked up.
#[derive(Clone, Debug)]
enum Target {
    Ipc(PathBuf),
    Tcp(Vec<SocketAddr>),
}

impl Target {
    fn resolve(endpoint: &Endpoint) -> Result<Target, TransportError> {
        match endpoint {
            Endpoint::Ipc(path) => Ok(Target::Ipc(path.clone())),
            Endpoint::Tcp { host, port } => (host.as_str(), *port)
                .to_socket_addrs()
                .map(|addrs| Target::Tcp(addrs.collect()))
                .map_err(|source| TransportError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                }),
        }
    }
}

enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    fn connect(target: &Target) -> io::Result<Stream> {
        match target {
            Target::Ipc(path) => UnixStream::connect(path).map(Stream::Unix),
            Target::Tcp(addrs) => {
                let stream = TcpStream::connect(&addrs[..])?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
        }
    }

    fn write_msg(&mut self, msg: &[u8]) -> io::Result<()> {
        let len = msg.len() as u32;
        self.write_all(&len.to_be_bytes())?;
        self.write_all(msg)?;
        self.flush()
    }

    fn read_msg(&mut self) -> io::Result<Vec<u8>> {
        let mut len = [0u8; 4];
        self.read_exact(&mut len)?;
        let len = u32::from_be_bytes(len) as usize;
        if len > MAX_MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message of {} bytes exceeds the limit", len),
            ));
        }
        let mut msg = vec![0u8; len];
        self.read_exact(&mut msg)?;
        Ok(msg)
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Stream::Unix(s) => s.as_raw_fd(),
            Stream::Tcp(s) => s.as_raw_fd(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

enum Listener {
    Unix { inner: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

impl Listener {
    fn bind(target: &Target) -> io::Result<Listener> {
        match target {
            Target::Ipc(path) => {
                // A socket file left behind by an earlier run would make bind fail.
                if path.exists() {
                    fs::remove_file(path)?;
                }
                let inner = UnixListener::bind(path)?;
                Ok(Listener::Unix {
                    inner,
                    path: path.clone(),
                })
            }
            Target::Tcp(addrs) => TcpListener::bind(&addrs[..]).map(Listener::Tcp),
        }
    }

    fn accept(&self) -> io::Result<Stream> {
        match self {
            Listener::Unix { inner, .. } => {
                let (stream, _) = inner.accept()?;
                stream.set_nonblocking(false)?;
                Ok(Stream::Unix(stream))
            }
            Listener::Tcp(inner) => {
                let (stream, _) = inner.accept()?;
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Listener::Unix { inner, .. } => inner.set_nonblocking(nonblocking),
            Listener::Tcp(inner) => inner.set_nonblocking(nonblocking),
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Listener::Unix { inner, .. } => inner.as_raw_fd(),
            Listener::Tcp(inner) => inner.as_raw_fd(),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            let _ = fs::remove_file(path);
        }
    }
}

fn bind(endpoint: &Endpoint) -> Result<(Target, Listener), TransportError> {
    let target = Target::resolve(endpoint)?;
    let listener = Listener::bind(&target).map_err(|source| TransportError::Bind {
        endpoint: endpoint.to_string(),
        source,
    })?;
    Ok((target, listener))
}

#[derive(Default)]
struct ShutdownState {
    closed: bool,
    fds: Vec<RawFd>,
}

/// Descriptors a blocked receive may be parked on, so that another thread can wake it.
///
/// A descriptor is only listed while its owner keeps it open: owners unregister under the
/// same lock before closing, so `close` never touches a stale or reused descriptor.
#[derive(Default)]
struct Shutdown {
    state: Mutex<ShutdownState>,
}

impl Shutdown {
    fn lock(&self) -> std::sync::MutexGuard<'_, ShutdownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn register(&self, fd: RawFd) -> io::Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.fds.push(fd);
        Ok(())
    }

    fn unregister(&self, fd: RawFd) {
        self.lock().fds.retain(|&registered| registered != fd);
    }

    fn clear(&self) {
        self.lock().fds.clear();
    }
}

impl Close for Shutdown {
    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        for &fd in &state.fds {
            // This block is marked as unsafe because it uses FFI. It is safe because `fd` is
            // registered, so its owner has not closed it yet and cannot close it while we
            // hold the lock. shutdown(2) touches no Rust-owned memory; a blocked accept or
            // read on the descriptor returns once it is shut down.
            unsafe {
                libc::shutdown(fd, libc::SHUT_RDWR);
            }
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

/// Receiving half over a unix or tcp stream. In the bind role it accepts one peer at a time
/// and accepts again when that peer goes away; in the connect role it dials on demand.
pub struct StreamRx {
    target: Target,
    listener: Option<Listener>,
    stream: Option<Stream>,
    shutdown: Arc<Shutdown>,
}

impl StreamRx {
    pub fn open(endpoint: &Endpoint, role: Role) -> Result<StreamRx, TransportError> {
        let shutdown = Arc::new(Shutdown::default());
        let (target, listener) = match role {
            Role::Bind => {
                let (target, listener) = bind(endpoint)?;
                // Unreachable failure: nothing has closed the fresh state yet.
                let _ = shutdown.register(listener.as_raw_fd());
                (target, Some(listener))
            }
            Role::Connect => (Target::resolve(endpoint)?, None),
        };
        Ok(StreamRx {
            target,
            listener,
            stream: None,
            shutdown,
        })
    }

    fn drop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.shutdown.unregister(stream.as_raw_fd());
        }
    }
}

impl MessageRx for StreamRx {
    fn recv_msg(&mut self) -> io::Result<Vec<u8>> {
        if self.shutdown.is_closed() {
            return Err(closed_error());
        }
        if self.stream.is_none() {
            let stream = match &self.listener {
                Some(listener) => listener.accept()?,
                None => Stream::connect(&self.target)?,
            };
            self.shutdown.register(stream.as_raw_fd())?;
            self.stream = Some(stream);
        }
        let result = match self.stream.as_mut() {
            Some(stream) => stream.read_msg(),
            None => Err(closed_error()),
        };
        if result.is_err() {
            self.drop_stream();
        }
        result
    }

    fn close_handle(&self) -> CloseHandle {
        self.shutdown.clone()
    }
}

impl Drop for StreamRx {
    fn drop(&mut self) {
        // Runs before the fields are dropped, so no descriptor is closed while listed.
        self.shutdown.clear();
    }
}

/// Sending half over a unix or tcp stream. In the bind role a send picks up a waiting peer
/// without blocking and fails with `NotConnected` while there is none; in the connect role it
/// dials on demand.
pub struct StreamTx {
    target: Target,
    listener: Option<Listener>,
    stream: Option<Stream>,
}

impl StreamTx {
    pub fn open(endpoint: &Endpoint, role: Role) -> Result<StreamTx, TransportError> {
        let (target, listener) = match role {
            Role::Bind => {
                let (target, listener) = bind(endpoint)?;
                listener
                    .set_nonblocking(true)
                    .map_err(|source| TransportError::Bind {
                        endpoint: endpoint.to_string(),
                        source,
                    })?;
                (target, Some(listener))
            }
            Role::Connect => (Target::resolve(endpoint)?, None),
        };
        Ok(StreamTx {
            target,
            listener,
            stream: None,
        })
    }

    fn peer(&mut self) -> io::Result<&mut Stream> {
        if self.stream.is_none() {
            let stream = match &self.listener {
                Some(listener) => match listener.accept() {
                    Ok(stream) => stream,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Err(io::Error::new(io::ErrorKind::NotConnected, "no peer yet"))
                    }
                    Err(e) => return Err(e),
                },
                None => Stream::connect(&self.target)?,
            };
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or_else(closed_error)
    }
}

impl MessageTx for StreamTx {
    fn send_msg(&mut self, msg: &[u8]) -> io::Result<()> {
        let result = self.peer()?.write_msg(msg);
        if result.is_err() {
            self.stream = None;
        }
        result
    }
}

/// Opens both directions for one side of the transport.
pub fn open_streams(endpoints: &Endpoints) -> Result<(StreamTx, StreamRx), TransportError> {
    let rx = StreamRx::open(&endpoints.rx, endpoints.role)?;
    let tx = StreamTx::open(&endpoints.tx, endpoints.role)?;
    Ok((tx, rx))
}
