//! Client network layer: one connection to the relay server, serviced once
//! per frame.

use crate::error::ClientError;
use crate::input::InputSample;
use crate::world::{Outbound, World};
use log::{debug, info, warn};
use shared::packet::{decode_server_packet, ClientInfo, Envelope, Message, Ping, PingEcho};
use shared::ping::PingEstimator;
use shared::transport::{Channel, Host, HostEvent, PeerId, CONNECT_TIMEOUT, DISCONNECT_DRAIN};
use shared::{Clock, DEFAULT_PORT};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Resolves a host name or address to the server's socket address.
pub fn resolve_server(host: &str) -> Result<SocketAddr, ClientError> {
    let has_port = host
        .rsplit_once(':')
        .map_or(false, |(_, port)| port.parse::<u16>().is_ok());
    let target = if has_port {
        host.to_string()
    } else {
        format!("{}:{}", host, DEFAULT_PORT)
    };

    target
        .to_socket_addrs()
        .map_err(|_| ClientError::Resolve(target.clone()))?
        .next()
        .ok_or(ClientError::Resolve(target))
}

pub struct Client {
    host: Host,
    server: PeerId,
    world: World,
    clock: Clock,
    ping: PingEstimator,
}

impl Client {
    /// Connects, announces the display name if any, and sends the initial
    /// full state.
    pub async fn connect(addr: SocketAddr, name: Option<&str>) -> Result<Self, ClientError> {
        let mut host = Host::outbound().await?;
        let server = host.connect(addr, CONNECT_TIMEOUT).await?;
        info!("Connected to {}", addr);

        let mut client = Client {
            host,
            server,
            world: World::new(name.unwrap_or("me")),
            clock: Clock::new(),
            ping: PingEstimator::new(),
        };

        if let Some(name) = name {
            let info = Envelope::new(ClientInfo::new(name)).encode_as_client()?;
            client.host.send(server, Channel::Control, &info)?;
        }
        let initial = client.world.initial_state();
        client.send_state(initial)?;
        client.host.flush().await;

        Ok(client)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn rtt_ms(&self) -> Option<u32> {
        self.ping.rtt_ms()
    }

    /// One frame: drain the transport, simulate, replicate, flush.
    pub async fn update(&mut self, input: InputSample, dt: f32) -> Result<(), ClientError> {
        while let Some(event) = self.host.service(Duration::ZERO).await? {
            match event {
                HostEvent::Receive { data, .. } => self.handle_packet(&data)?,
                HostEvent::Disconnect { .. } => {
                    info!("Server closed the connection");
                    return Err(ClientError::Disconnected);
                }
                HostEvent::Connect { .. } => {}
            }
        }

        self.world.step_local(&input, dt);
        self.world.advance(dt);

        if let Some(update) = self.world.replicate() {
            self.send_state(update)?;
        }

        if let Some(timestamp) = self.ping.poll(self.clock.now_ms()) {
            let ping = Envelope::new(Ping { timestamp }).encode_as_client()?;
            self.host.send(self.server, Channel::Control, &ping)?;
        }

        self.host.flush().await;
        Ok(())
    }

    /// Leaves, giving queued reliable data up to three seconds to drain.
    pub async fn shutdown(mut self) -> Result<(), ClientError> {
        info!("Disconnecting");
        self.host
            .disconnect_gracefully(self.server, DISCONNECT_DRAIN)
            .await?;
        Ok(())
    }

    fn handle_packet(&mut self, data: &[u8]) -> Result<(), ClientError> {
        let packet = match decode_server_packet(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Discarding packet: {}", e);
                return Ok(());
            }
        };

        match packet.message {
            Message::Ping(ping) => {
                // pings always carry our own id
                self.world.set_local_id(packet.client_id);
                let echo = Envelope::new(PingEcho::from(ping)).encode_as_client()?;
                self.host.send(self.server, Channel::Control, &echo)?;
            }
            Message::PingEcho(echo) => {
                self.world.set_local_id(packet.client_id);
                if !self.ping.on_echo(echo.timestamp, self.clock.now_ms()) {
                    debug!("Ignoring stale ping echo");
                }
            }
            _ => self.world.apply(packet),
        }
        Ok(())
    }

    fn send_state(&mut self, update: Outbound) -> Result<(), ClientError> {
        let data = match update {
            Outbound::Full(full) => {
                debug!("Sending full state");
                Envelope::new(full).encode_as_client()?
            }
            Outbound::Delta(delta) => Envelope::new(delta).encode_as_client()?,
        };
        self.host.send(self.server, Channel::State, &data)?;
        Ok(())
    }
}
