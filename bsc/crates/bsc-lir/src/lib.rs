//! bsc-lir - Low-level IR for Lowered Barriers
//!
//! Virtual-register instruction set produced by snippet lowering. Barrier fragments are
//! straight-line code with forward branches to per-fragment labels; the only calls are
//! to runtime routines described by [`ForeignCall`].

pub mod counter;
pub mod foreign;
pub mod lir;
pub mod narrow;

pub use counter::{Counter, CounterHandle};
pub use foreign::*;
pub use lir::*;
pub use narrow::CompressEncoding;
