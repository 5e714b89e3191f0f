use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tungstenite::{Message, WebSocket};

use crate::error::DeliveryError;
use crate::hub::{BroadcastHub, Viewer};
use crate::pixel::EncodedFrame;
use crate::shutdown::Shutdown;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const FRAME_WAIT: Duration = Duration::from_millis(20);
const READ_POLL: Duration = Duration::from_millis(1);
const QUEUE_DEPTH: usize = 8;

/// Hub-side end of a WebSocket viewer. Frames are queued for the
/// connection thread; the render thread never writes to a socket.
pub struct WsViewer {
    queue: Sender<EncodedFrame>,
}

impl Viewer for WsViewer {
    fn deliver(&self, frame: &EncodedFrame) -> Result<(), DeliveryError> {
        self.queue.try_send(frame.clone()).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Backlogged,
            TrySendError::Disconnected(_) => DeliveryError::Closed,
        })
    }
}

/// Accepts WebSocket viewers and registers them with the hub.
pub struct ViewerServer {
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
}

impl ViewerServer {
    pub fn bind(addr: SocketAddr, hub: Arc<BroadcastHub>) -> io::Result<ViewerServer> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let server = ViewerServer { listener, hub };
        log::info!("Accepting viewers on ws://{}", server.local_addr()?);
        Ok(server)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts until shutdown, then waits for every connection to hang up.
    pub fn run(&self, shutdown: &Shutdown) {
        let mut connections: Vec<JoinHandle<()>> = Vec::new();

        while !shutdown.is_requested() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let hub = Arc::clone(&self.hub);
                    let shutdown = shutdown.clone();
                    let res = thread::Builder::new()
                        .name(format!("Viewer {addr}"))
                        .spawn(move || serve(stream, addr, &hub, &shutdown));
                    match res {
                        Ok(handle) => connections.push(handle),
                        Err(err) => log::error!("Failed to create viewer thread: {err}"),
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(err) => log::warn!("Failed to accept viewer: {err}"),
            }
            connections.retain(|handle| !handle.is_finished());
        }

        for handle in connections {
            if handle.join().is_err() {
                log::error!("Viewer thread panicked");
            }
        }
    }
}

fn serve(stream: TcpStream, addr: SocketAddr, hub: &BroadcastHub, shutdown: &Shutdown) {
    if let Err(err) = stream.set_nonblocking(false) {
        log::warn!("Dropping viewer {addr}: {err}");
        return;
    }

    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(err) => {
            log::warn!("Handshake with {addr} failed: {err}");
            return;
        }
    };
    if let Err(err) = ws.get_mut().set_read_timeout(Some(READ_POLL)) {
        log::warn!("Dropping viewer {addr}: {err}");
        return;
    }

    let (sender, receiver) = crossbeam_channel::bounded(QUEUE_DEPTH);
    let id = hub.add_viewer(Arc::new(WsViewer { queue: sender }));
    log::info!("Viewer {addr} connected, {} watching", hub.viewer_count());

    match pump(&mut ws, &receiver, shutdown) {
        Ok(()) => log::info!("Viewer {addr} disconnected"),
        Err(err) => log::info!("Viewer {addr} dropped: {err}"),
    }
    hub.remove_viewer(id);
}

/// Writes queued frames and watches the socket for a hang-up.
fn pump(
    ws: &mut WebSocket<TcpStream>,
    frames: &Receiver<EncodedFrame>,
    shutdown: &Shutdown,
) -> tungstenite::Result<()> {
    loop {
        if shutdown.is_requested() {
            return close(ws);
        }

        match frames.recv_timeout(FRAME_WAIT) {
            Ok(frame) => ws.send(Message::text(frame.as_str()))?,
            Err(RecvTimeoutError::Timeout) => {}
            // The hub let go of us.
            Err(RecvTimeoutError::Disconnected) => return close(ws),
        }

        match ws.read() {
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
            Err(err) => return Err(err),
        }
    }
}

fn close(ws: &mut WebSocket<TcpStream>) -> tungstenite::Result<()> {
    ws.close(None)?;
    match ws.flush() {
        Err(tungstenite::Error::ConnectionClosed) => Ok(()),
        other => other,
    }
}
