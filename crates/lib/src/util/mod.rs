//! Content digests, plus fixtures for unit tests.

pub mod hash;

#[cfg(test)]
pub mod testutil;
