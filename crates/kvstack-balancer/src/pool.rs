//! Backend pool state: healthy slots and the traffic ledger.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Healthy view plus traffic ledger, guarded together so that selection
/// reads one consistent snapshot of both.
struct PoolState {
    /// One slot per configured backend, in configured order. `Some(addr)`
    /// while the backend is healthy, `None` otherwise. Starts all-`None`
    /// until the first successful probe.
    slots: Vec<Option<String>>,
    /// Total bytes forwarded from each backend to clients. Monotonic.
    bytes_served: HashMap<String, u64>,
}

/// The configured backend pool. Membership is fixed for the process
/// lifetime; only health and traffic change.
pub struct BackendPool {
    backends: Vec<String>,
    state: RwLock<PoolState>,
}

impl BackendPool {
    pub fn new(backends: Vec<String>) -> Self {
        let slots = vec![None; backends.len()];
        Self {
            backends,
            state: RwLock::new(PoolState {
                slots,
                bytes_served: HashMap::new(),
            }),
        }
    }

    /// The configured backends, in order.
    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    /// Pick the healthy backend that has served the fewest bytes. Empty
    /// slots are skipped; ties go to the earliest configured backend.
    /// `None` when no backend is healthy.
    pub fn pick_least_loaded(&self) -> Option<String> {
        let state = self.state.read();
        let mut best: Option<(&String, u64)> = None;
        for addr in state.slots.iter().flatten() {
            let served = state.bytes_served.get(addr).copied().unwrap_or(0);
            if best.map_or(true, |(_, min)| served < min) {
                best = Some((addr, served));
            }
        }
        best.map(|(addr, _)| addr.clone())
    }

    /// Flip the health slot for backend `index`.
    pub fn set_health(&self, index: usize, healthy: bool) {
        let mut state = self.state.write();
        state.slots[index] = if healthy {
            Some(self.backends[index].clone())
        } else {
            None
        };
    }

    /// Fold bytes delivered to a client into the ledger.
    pub fn record_bytes(&self, backend: &str, n: u64) {
        let mut state = self.state.write();
        let entry = state.bytes_served.entry(backend.to_string()).or_insert(0);
        *entry = entry.saturating_add(n);
    }

    /// Snapshot of the healthy slots, for observability and tests.
    pub fn healthy_slots(&self) -> Vec<Option<String>> {
        self.state.read().slots.clone()
    }

    /// Current ledger entry for a backend.
    pub fn bytes_for(&self, backend: &str) -> u64 {
        self.state
            .read()
            .bytes_served
            .get(backend)
            .copied()
            .unwrap_or(0)
    }
}
