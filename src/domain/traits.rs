use super::error::Result;
use super::{CreateOptions, ImageReference, PullCredential, RunningContainer};

/// Operations the supervisor needs from a container engine
pub trait ContainerEngine: Send + Sync {
    /// List containers that are currently running
    fn list_running(&self) -> Result<Vec<RunningContainer>>;

    /// Create a container and return its id
    fn create(&self, options: &CreateOptions) -> Result<String>;

    /// Start a previously created container
    fn start(&self, id: &str) -> Result<()>;

    /// Pull an image, authenticating first when a credential is given
    fn pull(&self, image: &ImageReference, credential: Option<&PullCredential>) -> Result<()>;

    /// Verify a registry credential
    fn auth_check(&self, credential: &PullCredential) -> Result<()>;
}

/// Receives an alert when a group is suspended. Delivery is best effort.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, image: &str) -> Result<()>;

    /// Startup check that the sink can deliver at all
    fn check(&self) -> Result<()> {
        Ok(())
    }
}
