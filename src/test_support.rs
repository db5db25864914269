use crate::domain::{
    ContainerEngine, CreateOptions, Error, ImageReference, NotificationSink, PullCredential,
    Result, RunningContainer,
};
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub image: String,
    pub running: bool,
    pub options: Option<CreateOptions>,
}

/// In-memory engine that records every call as `operation:argument`.
pub struct MockEngine {
    containers: RwLock<Vec<MockContainer>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    crashing: RwLock<HashSet<String>>,
    qualified: RwLock<bool>,
    next_id: RwLock<u64>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(Vec::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
            crashing: RwLock::new(HashSet::new()),
            qualified: RwLock::new(false),
            next_id: RwLock::new(0),
        }
    }

    /// Adds `count` already running containers of `image`.
    pub fn add_running(&self, image: &str, count: usize) {
        for _ in 0..count {
            let id = self.allocate_id();
            self.containers.write().unwrap().push(MockContainer {
                id,
                image: image.to_string(),
                running: true,
                options: None,
            });
        }
    }

    /// Marks every container of `image` as exited.
    pub fn kill_all(&self, image: &str) {
        for container in self.containers.write().unwrap().iter_mut() {
            if container.image == image {
                container.running = false;
            }
        }
    }

    /// Containers of `image` exit immediately after start.
    pub fn set_crashing(&self, image: &str) {
        self.crashing.write().unwrap().insert(image.to_string());
    }

    pub fn clear_crashing(&self, image: &str) {
        self.crashing.write().unwrap().remove(image);
    }

    /// List Docker Hub images fully qualified, the way Podman does.
    pub fn set_qualified_listing(&self, qualified: bool) {
        *self.qualified.write().unwrap() = qualified;
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn clear_fail_on(&self) {
        *self.fail_on.write().unwrap() = None;
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.write().unwrap().clear();
    }

    pub fn count_commands(&self, prefix: &str) -> usize {
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn running_count(&self, image: &str) -> usize {
        self.containers
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.running && c.image == image)
            .count()
    }

    /// Options passed to every successful create call, in order.
    pub fn created_options(&self) -> Vec<CreateOptions> {
        self.containers
            .read()
            .unwrap()
            .iter()
            .filter_map(|c| c.options.clone())
            .collect()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.write().unwrap();
        *next += 1;
        format!("{:064x}", *next)
    }

    fn record_command(&self, cmd: String) {
        self.commands.write().unwrap().push(cmd);
    }

    fn should_fail(&self, operation: &str) -> bool {
        self.fail_on.read().unwrap().as_deref() == Some(operation)
    }
}

/// `nginx` -> `docker.io/library/nginx:latest`
fn qualify(image: &str) -> String {
    let reference = ImageReference::parse(image);
    if !reference.registry.is_empty() {
        return image.to_string();
    }
    let repository = if reference.repository.contains('/') {
        reference.repository
    } else {
        format!("library/{}", reference.repository)
    };
    format!("docker.io/{repository}:{}", reference.tag)
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for MockEngine {
    fn list_running(&self) -> Result<Vec<RunningContainer>> {
        self.record_command("list".to_string());
        if self.should_fail("list") {
            return Err(Error::List("Mock failure on: list".into()));
        }

        let qualified = *self.qualified.read().unwrap();
        Ok(self
            .containers
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.running)
            .map(|c| {
                let image = if qualified {
                    qualify(&c.image)
                } else {
                    c.image.clone()
                };
                RunningContainer::new(c.id.clone(), image)
            })
            .collect())
    }

    fn create(&self, options: &CreateOptions) -> Result<String> {
        self.record_command(format!("create:{}", options.image));
        if self.should_fail("create") {
            return Err(Error::Create {
                image: options.image.clone(),
                reason: "Mock failure on: create".into(),
            });
        }

        let id = self.allocate_id();
        self.containers.write().unwrap().push(MockContainer {
            id: id.clone(),
            image: options.image.clone(),
            running: false,
            options: Some(options.clone()),
        });
        Ok(id)
    }

    fn start(&self, id: &str) -> Result<()> {
        self.record_command(format!("start:{id}"));
        if self.should_fail("start") {
            return Err(Error::Start {
                id: id.to_string(),
                reason: "Mock failure on: start".into(),
            });
        }

        let crashing = self.crashing.read().unwrap().clone();
        let mut containers = self.containers.write().unwrap();
        let Some(container) = containers.iter_mut().find(|c| c.id == id) else {
            return Err(Error::Start {
                id: id.to_string(),
                reason: "no such container".into(),
            });
        };
        container.running = !crashing.contains(&container.image);
        Ok(())
    }

    fn pull(&self, image: &ImageReference, credential: Option<&PullCredential>) -> Result<()> {
        let op = if credential.is_some() { "pull+auth" } else { "pull" };
        self.record_command(format!("{op}:{image}"));
        if self.should_fail("pull") {
            return Err(Error::Pull {
                reference: image.to_string(),
                reason: "Mock failure on: pull".into(),
            });
        }
        Ok(())
    }

    fn auth_check(&self, credential: &PullCredential) -> Result<()> {
        self.record_command(format!("auth:{}", credential.server_address));
        if self.should_fail("auth") {
            return Err(Error::Auth {
                server: credential.server_address.clone(),
                reason: "Mock failure on: auth".into(),
            });
        }
        Ok(())
    }
}

/// Notification sink that remembers what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<String>>,
    fail: RwLock<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.write().unwrap() = failing;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.read().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, image: &str) -> Result<()> {
        self.sent.write().unwrap().push(image.to_string());
        if *self.fail.read().unwrap() {
            return Err(Error::Notify("Mock failure on: notify".into()));
        }
        Ok(())
    }
}
