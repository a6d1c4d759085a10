use serde::Serialize;
use std::time::Instant;

/// Why a frame was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The in-flight slot was taken when the frame arrived.
    Busy,
    /// Packing or zoom failed on the capture side.
    Encode,
    /// The inference backend failed.
    Inference,
    /// A received image could not be decoded.
    Decode,
    /// No connection was available to send on.
    Disconnected,
    /// The presenter was behind and the view was skipped.
    Display,
}

/// Counters for one pipeline run.
pub struct PipelineStats {
    captured: u64,
    processed: u64,
    sent: u64,
    received: u64,
    busy_drops: u64,
    encode_failures: u64,
    inference_failures: u64,
    decode_failures: u64,
    disconnected_drops: u64,
    display_drops: u64,
    bytes_sent: u64,
    bytes_received: u64,
    start_time: Instant,
    latency_us: u64,
}

/// Snapshot of pipeline stats, serialisable for logs or a status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub fps: f64,
    pub captured: u64,
    pub processed: u64,
    pub sent: u64,
    pub received: u64,
    pub busy_drops: u64,
    pub encode_failures: u64,
    pub inference_failures: u64,
    pub decode_failures: u64,
    pub disconnected_drops: u64,
    pub display_drops: u64,
    pub drop_rate: f64,
    pub latency_ms: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            captured: 0,
            processed: 0,
            sent: 0,
            received: 0,
            busy_drops: 0,
            encode_failures: 0,
            inference_failures: 0,
            decode_failures: 0,
            disconnected_drops: 0,
            display_drops: 0,
            bytes_sent: 0,
            bytes_received: 0,
            start_time: Instant::now(),
            latency_us: 0,
        }
    }

    /// Record a frame handed over by the capture source.
    pub fn record_captured(&mut self) {
        self.captured += 1;
    }

    /// Record a frame that made it through local inference and rendering.
    /// `capture_timestamp_us` is measured from the stats' start.
    pub fn record_processed(&mut self, capture_timestamp_us: u64) {
        self.processed += 1;
        let now_us = self.start_time.elapsed().as_micros() as u64;
        if capture_timestamp_us <= now_us {
            self.latency_us = now_us - capture_timestamp_us;
        }
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::Busy => &mut self.busy_drops,
            DropReason::Encode => &mut self.encode_failures,
            DropReason::Inference => &mut self.inference_failures,
            DropReason::Decode => &mut self.decode_failures,
            DropReason::Disconnected => &mut self.disconnected_drops,
            DropReason::Display => &mut self.display_drops,
        };
        *counter += 1;
    }

    /// Captured frames per second since start.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.captured as f64 / elapsed
    }

    /// Share of captured frames that never reached the expensive path,
    /// as a percentage (0.0 - 100.0).
    pub fn drop_rate(&self) -> f64 {
        if self.captured == 0 {
            return 0.0;
        }
        let dropped = self.busy_drops + self.encode_failures + self.disconnected_drops;
        (dropped as f64 / self.captured as f64 * 100.0).min(100.0)
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_us as f64 / 1000.0
    }

    /// Microseconds since these stats started, the clock frame timestamps
    /// are compared against.
    pub fn now_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            fps: self.fps(),
            captured: self.captured,
            processed: self.processed,
            sent: self.sent,
            received: self.received,
            busy_drops: self.busy_drops,
            encode_failures: self.encode_failures,
            inference_failures: self.inference_failures,
            decode_failures: self.decode_failures,
            disconnected_drops: self.disconnected_drops,
            display_drops: self.display_drops,
            drop_rate: self.drop_rate(),
            latency_ms: self.latency_ms(),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
