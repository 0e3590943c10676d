use std::time::Instant;

/// Connection supervisor counters
#[derive(Debug, Clone, Default)]
pub struct SupervisorStats {
    pub payloads_sent: u64,
    pub payloads_dropped: u64,
    pub bytes_sent: u64,
    pub control_messages_sent: u64,
    pub reconnect_attempts: u64,
    pub successful_connections: u64,
    pub transport_failures: u64,
    pub pings_sent: u64,
    pub last_connected_at: Option<Instant>,
}

impl SupervisorStats {
    pub fn record_sent(&mut self, size: usize) {
        self.payloads_sent += 1;
        self.bytes_sent += size as u64;
    }

    pub fn record_dropped(&mut self) {
        self.payloads_dropped += 1;
    }

    pub fn record_connected(&mut self) {
        self.successful_connections += 1;
        self.last_connected_at = Some(Instant::now());
    }

    /// Fraction of payloads that reached the wire
    pub fn delivery_ratio(&self) -> f64 {
        let total = self.payloads_sent + self.payloads_dropped;
        if total > 0 {
            self.payloads_sent as f64 / total as f64
        } else {
            1.0
        }
    }
}
