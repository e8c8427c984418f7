use crate::engine::SynthEngine;
use crate::error::{ChimeError, Result};
use crate::types::AudioParams;
use log::{debug, error, info};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Drives an external synthesis engine over OSC/UDP.
///
/// Address space:
///   /chime/load    s          voice source text
///   /chime/trigger f f f      frequency_hz, pan, strike_force
///   /chime/param   s f        continuous parameter
///   /chime/stop
///
/// UDP gives no delivery guarantee, so triggers are fire-and-forget; send
/// failures are logged at debug and otherwise ignored.
pub struct OscEngine {
    target: String,
    socket: Option<UdpSocket>,
    addr: Option<SocketAddr>,
}

impl OscEngine {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            socket: None,
            addr: None,
        }
    }

    fn send(&self, addr: &str, args: Vec<OscType>) -> Result<()> {
        let (socket, target) = match (&self.socket, self.addr) {
            (Some(s), Some(a)) => (s, a),
            _ => return Err(ChimeError::NotReady),
        };
        let msg = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&msg)?;
        socket.send_to(&buf, target)?;
        Ok(())
    }

    fn send_source(&self, source: &str) -> Result<()> {
        if source.trim().is_empty() {
            return Err(ChimeError::MalformedSource("empty source".into()));
        }
        self.send("/chime/load", vec![OscType::String(source.to_string())])
    }
}

impl SynthEngine for OscEngine {
    fn initialize(&mut self, source: &str) -> Result<()> {
        let addr = self
            .target
            .to_socket_addrs()
            .map_err(|e| ChimeError::Engine(format!("resolve {}: {}", self.target, e)))?
            .next()
            .ok_or_else(|| ChimeError::Engine(format!("no address for {}", self.target)))?;
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| {
            error!("Failed to bind UDP socket: {}", e);
            ChimeError::Engine(e.to_string())
        })?;
        self.socket = Some(socket);
        self.addr = Some(addr);

        if let Err(e) = self.send_source(source) {
            self.socket = None;
            self.addr = None;
            return Err(e);
        }
        info!("OSC engine → {}", addr);
        Ok(())
    }

    fn load_source(&mut self, source: &str) -> Result<()> {
        self.send_source(source)
    }

    fn trigger(&mut self, params: &AudioParams) {
        let args = vec![
            OscType::Float(params.frequency_hz as f32),
            OscType::Float(params.pan as f32),
            OscType::Float(params.strike_force as f32),
        ];
        if let Err(e) = self.send("/chime/trigger", args) {
            debug!("OSC trigger error: {}", e);
        }
    }

    fn set_continuous_parameter(&mut self, name: &str, value: f64) {
        let args = vec![OscType::String(name.to_string()), OscType::Float(value as f32)];
        if let Err(e) = self.send("/chime/param", args) {
            debug!("OSC param error: {}", e);
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.send("/chime/stop", Vec::new()) {
            debug!("OSC stop error: {}", e);
        }
        self.socket = None;
        self.addr = None;
        info!("OSC engine stopped");
    }
}
