//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Call registry (per-key timing, queues and pending timers)
//! - Dispatch disciplines (immediate, queue, deferred)
//! - Limiter (routing, inspection and lifecycle)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod dispatch;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod reporter;
pub mod timer;
