#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod http;
pub mod intake;
pub mod models;
pub mod persistence;
pub mod pipeline;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
