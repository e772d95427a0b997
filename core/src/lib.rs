pub mod checksums;
pub mod config;
pub mod errors;
pub mod output;
pub mod process;

pub use config::Config;
pub use errors::ExtractError;
pub use process::{ProcessStats, process_vdex, update_checksums};
