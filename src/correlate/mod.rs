//! Event-correlation primitives: deterministic sampling, TTL-bounded
//! pending state, start/end pairing, and consumed-time ratios.

pub mod cache;
pub mod pair;
pub mod ratio;
pub mod sampling;
