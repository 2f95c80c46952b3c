//! Server network layer binding the transport to the relay

use crate::error::ServerError;
use crate::relay::Relay;
use log::{debug, error, info, warn};
use shared::transport::{Host, HostEvent};
use shared::Clock;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::ToSocketAddrs;

/// Longest a tick waits for the first event.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Single-threaded relay server
pub struct Server {
    host: Host,
    relay: Relay,
    clock: Clock,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, max_peers: usize) -> Result<Self, ServerError> {
        let host = Host::bind(addr, max_peers).await.map_err(|e| {
            error!("Failed to start transport: {}", e);
            e
        })?;

        Ok(Server {
            host,
            relay: Relay::new(),
            clock: Clock::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.host.local_addr()?)
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Runs ticks until the transport fails.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!("Server started on {}", self.local_addr()?);
        loop {
            if let Err(e) = self.tick().await {
                error!("Transport failure: {}", e);
                return Err(e);
            }
        }
    }

    /// One pass of the event loop: wait up to [`POLL_TIMEOUT`] for an event,
    /// drain whatever else is pending, poll pings, then send and flush.
    pub async fn tick(&mut self) -> Result<(), ServerError> {
        let mut timeout = POLL_TIMEOUT;
        while let Some(event) = self.host.service(timeout).await? {
            self.handle_event(event);
            timeout = Duration::ZERO;
        }

        let now_ms = self.clock.now_ms();
        self.relay.poll_pings(now_ms)?;

        for outgoing in self.relay.drain_outgoing() {
            if let Err(e) = self
                .host
                .send(outgoing.peer, outgoing.channel, &outgoing.data)
            {
                debug!("Dropping message for {}: {}", outgoing.peer, e);
            }
        }
        self.host.flush().await;
        Ok(())
    }

    fn handle_event(&mut self, event: HostEvent) {
        let now_ms = self.clock.now_ms();
        let result = match event {
            HostEvent::Connect { peer, addr } => {
                self.relay.on_connect(peer, &addr.to_string(), now_ms)
            }
            HostEvent::Receive {
                peer,
                channel,
                data,
            } => self.relay.on_packet(peer, channel, &data, now_ms),
            HostEvent::Disconnect { peer } => self.relay.on_disconnect(peer),
        };

        if let Err(e) = result {
            warn!("Discarding event: {}", e);
        }
    }
}
