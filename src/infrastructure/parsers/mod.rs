pub mod config_parser;

pub use config_parser::{ConfigParser, RosterConfig, WorkerConfig};
