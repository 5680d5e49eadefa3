//! Shared utilities.

pub mod duration;
pub mod hash;

#[cfg(test)]
pub mod testutil;
