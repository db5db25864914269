pub mod cli_engine;
pub mod config;
pub mod notifier;

pub use cli_engine::CliEngine;
pub use config::{GlobalConfig, NotificationConfig};
pub use notifier::{LogNotifier, MailNotifier};
