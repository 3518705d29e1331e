pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod storage;
pub mod validation;

#[cfg(test)]
pub mod testing;

pub use models::*;
pub use services::*;
pub use validation::*;
