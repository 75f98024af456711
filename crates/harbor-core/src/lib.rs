pub mod config;
pub mod credentials;
pub mod types;

pub use config::{HarborConfig, ProbeMode, Topology};
pub use credentials::Credentials;
pub use types::*;
