//! Domain layer - pure business logic with no runtime dependencies.
//!
//! This layer contains the core concepts and invariants of call governing:
//! - Response headers and their values
//! - Hint extraction (Retry-After and reset headers)
//! - Per-key not-before timing
//! - Limits, disciplines and cancellation scope
//!
//! All types in this layer are pure and easily testable.

pub mod call_state;
pub mod headers;
pub mod hint;
pub mod limit;
