pub mod config;
pub mod error;
pub mod quality;
pub mod types;

pub use config::Config;
pub use error::VerityError;
pub use quality::*;
pub use types::*;
