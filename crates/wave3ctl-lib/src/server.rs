//! Boundary server — exposes the transfer proxy on a Unix domain socket.
//!
//! The daemon runs with the privileges needed to reach the device; callers
//! connect to the socket and exchange fixed-size frames (see [`crate::frame`]).
//! Each connection gets its own thread and may send any number of requests.

use std::io::{self, Read, Write};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::device::UsbBus;
use crate::frame::{self, FrameRead};
use crate::protocol::{REQUEST_FRAME_SIZE, RESPONSE_FRAME_SIZE, STATUS_OK, WAVE3_CTL};
use crate::proxy::{ProxyError, TransferProxy};
use crate::xfer::TransferDescriptor;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// A connection that sends nothing for this long is dropped; a frame still
/// incomplete after it is a boundary fault.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Connections served at once; further ones are refused.
pub const MAX_CONNECTIONS: usize = 64;

/// Live-connection slot, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> Option<Self> {
        active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < MAX_CONNECTIONS).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionSlot(Arc::clone(active)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Remove a leftover socket file at `path`; anything else there is an error.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !meta.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        ));
    }
    std::fs::remove_file(path)?;
    log::info!("removed stale socket {}", path.display());
    Ok(())
}

/// Turn one request frame into its response frame.
///
/// On any failure the response echoes the request descriptor unchanged.
pub fn handle_request<B: UsbBus>(
    proxy: &TransferProxy<B>,
    request: &[u8; REQUEST_FRAME_SIZE],
) -> [u8; RESPONSE_FRAME_SIZE] {
    let (command, desc) = frame::decode_request(request);
    if command != WAVE3_CTL {
        log::debug!("unknown command 0x{command:08X}");
        return frame::encode_response(ProxyError::UnknownCommand.status(), &desc);
    }
    match proxy.execute(desc.clone()) {
        Ok(out) => frame::encode_response(STATUS_OK, &out),
        Err(e) => {
            log::debug!("request failed: {e}");
            frame::encode_response(e.status(), &desc)
        }
    }
}

/// Serve frames on one stream until the peer closes it.
///
/// Returns the number of requests answered.
pub fn serve_connection<B: UsbBus, S: Read + Write>(
    proxy: &TransferProxy<B>,
    stream: &mut S,
) -> io::Result<usize> {
    let mut served = 0;
    loop {
        let request = match frame::read_frame::<REQUEST_FRAME_SIZE>(stream)? {
            FrameRead::Frame(buf) => buf,
            FrameRead::Closed => return Ok(served),
            FrameRead::Truncated { got } => {
                log::warn!(
                    "boundary fault: request truncated at {got} of {REQUEST_FRAME_SIZE} bytes"
                );
                let fault = frame::encode_response(
                    ProxyError::BoundaryFault.status(),
                    &TransferDescriptor::default(),
                );
                // Best effort: the peer may already be gone.
                let _ = stream.write_all(&fault);
                return Ok(served);
            }
        };
        let response = handle_request(proxy, &request);
        if let Err(e) = stream.write_all(&response).and_then(|_| stream.flush()) {
            log::warn!("boundary fault: response not delivered: {e}");
            return Err(e);
        }
        served += 1;
    }
}

/// Listening socket bound to a path; the socket file is removed on drop.
pub struct ProxyServer<B: UsbBus + 'static> {
    listener: UnixListener,
    path: PathBuf,
    proxy: Arc<TransferProxy<B>>,
    read_timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl<B: UsbBus + 'static> ProxyServer<B> {
    /// Bind `path` (replacing a stale socket file) and apply `mode` to it.
    ///
    /// Refuses to start if `path` exists and is not a socket.
    pub fn bind(path: &Path, mode: u32, proxy: TransferProxy<B>) -> io::Result<Self> {
        remove_stale_socket(path)?;
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let listener = UnixListener::bind(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        listener.set_nonblocking(true)?;
        log::info!(
            "listening on {} (mode {mode:o}, target {})",
            path.display(),
            proxy.target()
        );
        Ok(ProxyServer {
            listener,
            path: path.to_path_buf(),
            proxy: Arc::new(proxy),
            read_timeout: DEFAULT_READ_TIMEOUT,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until `running` is cleared.
    pub fn run(&self, running: &AtomicBool) -> io::Result<()> {
        while running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((mut stream, _)) => {
                    let Some(slot) = ConnectionSlot::acquire(&self.active) else {
                        log::warn!("refusing connection: {MAX_CONNECTIONS} already open");
                        continue;
                    };
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(self.read_timeout))?;
                    let proxy = Arc::clone(&self.proxy);
                    std::thread::spawn(move || {
                        let _slot = slot;
                        match serve_connection(&proxy, &mut stream) {
                            Ok(n) => log::debug!("connection closed after {n} request(s)"),
                            Err(e) => log::debug!("connection ended: {e}"),
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        log::info!("shutting down");
        Ok(())
    }
}

impl<B: UsbBus + 'static> Drop for ProxyServer<B> {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("could not remove {}: {e}", self.path.display());
        }
    }
}
