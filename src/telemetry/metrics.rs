//! Per-link packet counters.
//!
//! Counters are atomic so a status reader on another task can sample them
//! while the link keeps running.

use crate::engine::ProtocolKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for one control protocol.
#[derive(Debug, Default)]
pub struct ProtocolStats {
    pub rx_packets: Counter,
    pub rx_bytes: Counter,
    pub tx_packets: Counter,
    pub tx_bytes: Counter,
    /// Packets dropped because they arrived in the wrong phase
    pub rx_dropped: Counter,
}

impl ProtocolStats {
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }

    pub fn record_drop(&self) {
        self.rx_dropped.inc();
    }
}

/// Statistics for one link, keyed by protocol.
#[derive(Debug, Default)]
pub struct LinkStats {
    lcp: ProtocolStats,
    pap: ProtocolStats,
    ipcp: ProtocolStats,
    /// Frames for protocol numbers we do not run
    pub rx_unknown: Counter,
    /// Packets that failed to parse
    pub rx_malformed: Counter,
    pub loopbacks_detected: Counter,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(&self, kind: ProtocolKind) -> &ProtocolStats {
        match kind {
            ProtocolKind::Lcp => &self.lcp,
            ProtocolKind::Pap => &self.pap,
            ProtocolKind::Ipcp => &self.ipcp,
        }
    }

    /// Exports all counters as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = Vec::new();
        for kind in ProtocolKind::ALL {
            let stats = self.protocol(kind);
            let name = kind.name().to_lowercase();
            result.extend([
                (format!("{}_rx_packets", name), stats.rx_packets.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_packets", name), stats.tx_packets.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_rx_dropped", name), stats.rx_dropped.get()),
            ]);
        }
        result.extend([
            ("rx_unknown".into(), self.rx_unknown.get()),
            ("rx_malformed".into(), self.rx_malformed.get()),
            ("loopbacks_detected".into(), self.loopbacks_detected.get()),
        ]);
        result
    }
}
