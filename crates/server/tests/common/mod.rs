//! Common test utilities and fixtures.

pub mod fixtures;
pub mod gateway;
pub mod metadata;
pub mod server;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use gateway::*;
#[allow(unused_imports)]
pub use metadata::*;
#[allow(unused_imports)]
pub use server::*;
