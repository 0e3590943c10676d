use std::time::Instant;

/// Capture pipeline counters; every received video frame ends in exactly one bucket
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub frames_received: u64,
    pub non_video_ignored: u64,
    pub queue_full_dropped: u64,
    pub idle_dropped: u64,
    pub encode_failures: u64,
    pub frames_sent: u64,
    pub disconnected_dropped: u64,
    pub bytes_sent: u64,
    pub last_sent_at: Option<Instant>,
}

impl PipelineStats {
    pub fn record_sent(&mut self, size: usize) {
        self.frames_sent += 1;
        self.bytes_sent += size as u64;
        self.last_sent_at = Some(Instant::now());
    }

    pub fn frames_dropped(&self) -> u64 {
        self.queue_full_dropped + self.idle_dropped + self.encode_failures + self.disconnected_dropped
    }

    /// Video frames not yet accounted for: queued or being encoded
    pub fn in_flight(&self) -> u64 {
        self.frames_received
            .saturating_sub(self.frames_sent + self.frames_dropped())
    }

    pub fn efficiency(&self) -> f64 {
        let total = self.frames_sent + self.frames_dropped();
        if total > 0 {
            self.frames_sent as f64 / total as f64
        } else {
            1.0
        }
    }

    pub fn average_payload_size(&self) -> f64 {
        if self.frames_sent > 0 {
            self.bytes_sent as f64 / self.frames_sent as f64
        } else {
            0.0
        }
    }
}
