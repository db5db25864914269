mod container;
pub mod error;
mod group;
pub mod image;
pub mod traits;

pub use container::{
    ContainerSpec, CreateOptions, PortBinding, RunningContainer, VolumeBind, short_id,
};
pub use error::{Error, Result};
pub use group::{Group, GroupState, GroupStatus, RetryPolicy, Transition};
pub use image::{CredentialMatch, ImageReference, PullCredential, select_credential};
pub use traits::{ContainerEngine, NotificationSink};
