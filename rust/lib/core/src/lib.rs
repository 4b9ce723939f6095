pub mod config;
pub mod error;
pub mod types;

pub use config::{AuthConfig, StoreConfig};
pub use error::CardError;
pub use types::{parse_rfc3339, sanitize_file_name, short_id};
