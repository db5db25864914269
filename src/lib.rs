pub mod cli;
pub mod domain;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    ContainerEngine, ContainerSpec, CreateOptions, Error, Group, GroupState, GroupStatus,
    ImageReference, NotificationSink, PullCredential, Result,
};
pub use infra::{CliEngine, LogNotifier, MailNotifier};
pub use services::{ImageService, Reconciler, Ticker, build_groups, translate};
