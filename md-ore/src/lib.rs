//! Extensions to the `core` or `std` libraries, shared across the `md-*` crates.

pub mod assert;
pub mod xml;
