pub mod config;
pub mod error;
pub mod error_utils;
pub mod filter;
pub mod platform;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use filter::*;
pub use platform::*;
pub use types::*;
