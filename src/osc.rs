use std::{
    io,
    net::{SocketAddr, UdpSocket},
    sync::Arc,
    time::Duration,
};

use rosc::{decoder, OscMessage, OscPacket, OscType};

use crate::registry::ParameterRegistry;
use crate::shutdown::Shutdown;

/// Parameter updates over OSC: `/<operation>/<tag>` with a single argument.
pub struct OscReceiver {
    sock: UdpSocket,
    registry: Arc<ParameterRegistry>,
}

impl OscReceiver {
    pub fn new(listen_addr: SocketAddr, registry: Arc<ParameterRegistry>) -> io::Result<Self> {
        let sock = UdpSocket::bind(listen_addr)?;
        // Lets `run` notice shutdown while nobody is talking to us.
        sock.set_read_timeout(Some(Duration::from_millis(250)))?;

        let receiver = OscReceiver { sock, registry };
        log::info!("Listening for OSC on {}", receiver.local_addr()?);
        Ok(receiver)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    pub fn run(&self, shutdown: &Shutdown) {
        let mut buf = [0u8; rosc::decoder::MTU];

        while !shutdown.is_requested() {
            match self.sock.recv_from(&mut buf) {
                Ok((size, addr)) => {
                    log::debug!("Received packet with size {} from: {}", size, addr);
                    match decoder::decode(&buf[..size]) {
                        Ok(packet) => self.handle_packet(packet),
                        Err(err) => log::warn!("Undecodable OSC packet from {addr}: {err:?}"),
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(err) => {
                    log::error!("Error receiving from socket: {}", err);
                    break;
                }
            }
        }
    }

    fn handle_packet(&self, packet: OscPacket) {
        match packet {
            OscPacket::Message(msg) => self.handle_message(&msg),
            OscPacket::Bundle(bundle) => {
                for packet in bundle.content {
                    self.handle_packet(packet);
                }
            }
        }
    }

    fn handle_message(&self, msg: &OscMessage) {
        let name = msg.addr.strip_prefix('/').unwrap_or(&msg.addr);
        let payload = match msg.args.as_slice() {
            [arg] => payload_text(arg),
            _ => None,
        };

        match payload {
            Some(payload) => {
                // Outcome is logged by the registry.
                let _ = self.registry.handle(name, &payload);
            }
            None => log::warn!(
                "{} expected a single float, int, bool or string, got {:?}",
                msg.addr,
                msg.args
            ),
        }
    }
}

/// Text form of an OSC argument, as it would arrive over MQTT.
fn payload_text(arg: &OscType) -> Option<String> {
    match arg {
        OscType::Float(v) => Some(v.to_string()),
        OscType::Double(v) => Some(v.to_string()),
        OscType::Int(v) => Some(v.to_string()),
        OscType::Long(v) => Some(v.to_string()),
        OscType::Bool(v) => Some(v.to_string()),
        OscType::String(v) => Some(v.clone()),
        _ => None,
    }
}
