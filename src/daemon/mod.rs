//! Daemon subsystem: resize loop, restart hook, service installation and
//! signal handling.

#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod restart;
pub mod service;
#[cfg(feature = "daemon")]
pub mod signals;
