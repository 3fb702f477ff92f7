//! .NET runtime monitoring agent.
//!
//! Runtimoor ingests binary runtime events (GC, contention, JIT, thread
//! pool, exceptions) over a local TCP socket, correlates start/end pairs
//! into durations, and exposes the results as Prometheus metrics.

pub mod agent;
pub mod config;
pub mod correlate;
pub mod export;
pub mod ingest;
pub mod parsers;
pub mod producers;
