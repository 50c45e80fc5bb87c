//! Host-facing command contract, router, and stdio transport.

pub mod channel;
pub mod contract;
pub mod stdio;
