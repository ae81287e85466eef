//! HTTP request handlers.

pub mod files;
pub mod health;
pub mod uploads;

pub use files::*;
pub use health::*;
pub use uploads::*;
