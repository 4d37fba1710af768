//! Adapters -- default, transport-free implementations of the `ports`
//! traits. None of these talk to a network, filesystem, or database: the
//! engine's core has nothing to adapt to except the tool-function boundary
//! itself (§1's Non-goals exclude HTTP callers, string ops, and cache
//! layers from the core).
//!
//! - `std_tools` -- the built-in `std` namespace (§4.4).
//! - `tracing_logger` -- a [`crate::ports::Logger`] backed by the `tracing`
//!   crate for structured, leveled log output.
//! - `memory_cache` -- an in-memory [`crate::ports::CacheStore`] for tests
//!   and embedding hosts with no external cache of their own.

pub mod memory_cache;
pub mod std_tools;
pub mod tracing_logger;

pub use memory_cache::InMemoryCacheStore;
pub use tracing_logger::TracingLogger;
