pub mod error;
pub mod logger;
pub mod monitor;
pub mod shutdown;
pub mod validation;
