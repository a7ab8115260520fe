//! SentinelGate gateway: the interceptor chain, approval coordinator,
//! audit stream, and the loopback-only admin/SDK HTTP surface.

pub mod api;
pub mod bootstrap;
pub mod chain;
pub mod cli;
pub mod defaults;
pub mod runtime;
pub mod state;
