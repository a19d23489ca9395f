//! aerosync - group commit synchronization core for write-ahead logging
//!
//! Many committers, one flush: threads wait on a monotonic durable LSN, and
//! the lock elects exactly one of them to perform the physical flush on
//! behalf of everyone it will satisfy.

pub mod cli;
pub mod flush;
pub mod observability;
pub mod sync;
