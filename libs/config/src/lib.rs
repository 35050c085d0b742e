//! # Bus Client Configuration
//!
//! Key/value options that drive every bus component: which middleware to
//! load, which broker to join, whether outgoing content is validated, and
//! how chatty the logs are.
//!
//! ## Sources
//!
//! - **Command line**: `key=value` tokens via [`Config::from_args`]
//! - **XML files**: named `<CONFIG>` sections via [`Config::from_file`]
//! - **JSON**: [`Config::from_json`] / [`Config::to_json`]
//!
//! ## Usage
//!
//! ```rust
//! use config::Config;
//!
//! let config = Config::from_args(["mw-id=loopback", "loglevel=debug"]);
//! assert_eq!(config.get_value("MW-ID", "none"), "loopback");
//! assert!(!config.get_boolean_value("msg-content-validate", false));
//! ```

mod config;
pub mod error;
pub mod file;

pub use config::Config;
pub use error::{ConfigError, ConfigResult};
pub use file::ConfigFile;
