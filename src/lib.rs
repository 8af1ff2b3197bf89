#![forbid(unsafe_code)]

//! embiggen-disk: grow a mounted filesystem, and every storage layer beneath
//! it, to fill a disk that was enlarged underneath a running machine.
//!
//! A mount point resolves to a chain of [`resize::resizer::Resizer`]s
//! (filesystem, LVM logical volume, LVM physical volume, partition). The
//! chain is grown dependency-first and every layer whose state changed is
//! reported as a [`resize::resizer::ChangeRecord`].
//!
//! # Library usage
//!
//! ```rust,no_run
//! use embiggen_disk::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use embiggen_disk::resize::chain::resize_chain;
//! use embiggen_disk::resolver::system::SystemChainResolver;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod platform;
pub mod resize;
pub mod resolver;
