//! Service-level infrastructure shared by every crate: configuration and logging.

pub mod config;
pub mod logging;
