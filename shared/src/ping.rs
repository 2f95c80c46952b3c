//! Round-trip time measurement through timestamped ping echoes.

use log::debug;

pub const PING_INTERVAL_MS: u32 = 10_000;

/// Issues one ping per interval and times the echo.
///
/// Timestamps come from a wrapping `u32` millisecond clock, so all
/// differences are taken with `wrapping_sub`.
#[derive(Debug, Clone)]
pub struct PingEstimator {
    interval_ms: u32,
    last_sent: Option<u32>,
    outstanding: Option<u32>,
    rtt_ms: Option<u32>,
}

impl PingEstimator {
    pub fn new() -> Self {
        Self::with_interval(PING_INTERVAL_MS)
    }

    pub fn with_interval(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_sent: None,
            outstanding: None,
            rtt_ms: None,
        }
    }

    /// Timestamp to send when a ping is due. The first call always fires.
    pub fn poll(&mut self, now_ms: u32) -> Option<u32> {
        let due = match self.last_sent {
            None => true,
            Some(sent) => now_ms.wrapping_sub(sent) >= self.interval_ms,
        };
        if !due {
            return None;
        }

        self.last_sent = Some(now_ms);
        self.outstanding = Some(now_ms);
        Some(now_ms)
    }

    /// Times an echo against the outstanding ping.
    ///
    /// Only [`PingEcho`](crate::packet::PingEcho) packets reach this, so a
    /// mismatch means a stale or duplicated echo. It is ignored and false is
    /// returned.
    pub fn on_echo(&mut self, timestamp: u32, now_ms: u32) -> bool {
        if self.outstanding != Some(timestamp) {
            return false;
        }

        let rtt = now_ms.wrapping_sub(timestamp);
        debug!("RTT sample {}ms", rtt);
        self.rtt_ms = Some(rtt);
        self.outstanding = None;
        true
    }

    pub fn rtt_ms(&self) -> Option<u32> {
        self.rtt_ms
    }

    /// RTT as carried in relayed full states: 0 until measured, saturated.
    pub fn wire_ping(&self) -> u16 {
        self.rtt_ms
            .map(|rtt| rtt.min(u16::MAX as u32) as u16)
            .unwrap_or(0)
    }
}

impl Default for PingEstimator {
    fn default() -> Self {
        Self::new()
    }
}
