//! Reverse HTTP proxy that forwards every request to the healthy backend
//! which has served the fewest bytes so far.
//!
//! Three pieces: [`pool::BackendPool`] holds the slot-positioned healthy
//! view of the configured backends together with the per-backend traffic
//! ledger; [`health::HealthMonitor`] probes each backend's `/health`
//! endpoint on a fixed interval and flips its slot; [`proxy`] selects a
//! target, streams the exchange through, and accounts the bytes actually
//! delivered to the client.

pub mod health;
pub mod pool;
pub mod proxy;

pub use pool::BackendPool;
