//! Common test utilities for record-sweep integration tests

#[allow(dead_code)]
pub mod executor;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use executor::*;
#[allow(unused_imports)]
pub use fixtures::*;
