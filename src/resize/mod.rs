//! Resizer contract and the dependency-first chain walk.

pub mod chain;
pub mod resizer;
