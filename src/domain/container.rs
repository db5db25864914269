use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Desired state for one group of identical containers, as declared in a
/// spec file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Fixed container name. Only honoured when exactly one instance is desired.
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub instances: u32,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// File the spec was read from.
    #[serde(skip)]
    pub source: PathBuf,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, instances: u32) -> Self {
        Self {
            container_name: None,
            instances,
            image: image.into(),
            ports: Vec::new(),
            volumes: Vec::new(),
            env: BTreeMap::new(),
            source: PathBuf::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    pub fn with_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = ports.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_volumes<I, S>(mut self, volumes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volumes = volumes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Name used in log lines and validation messages.
    pub fn source_name(&self) -> String {
        if self.source.as_os_str().is_empty() {
            return self.image.clone();
        }
        self.source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// A host-side binding for one container port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PortBinding {
    /// `None` binds on all host interfaces.
    pub host_ip: Option<String>,
    pub host_port: u16,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host_ip {
            Some(ip) => write!(f, "{ip}:{}", self.host_port),
            None => write!(f, "{}", self.host_port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBind {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeBind {
    pub fn mode(&self) -> &'static str {
        if self.read_only { "ro" } else { "rw" }
    }
}

impl fmt::Display for VolumeBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.host_path,
            self.container_path,
            self.mode()
        )
    }
}

/// Engine-facing creation parameters, derived once per spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub name: Option<String>,
    pub image: String,
    /// Container ports in `N/tcp` form.
    pub exposed_ports: BTreeSet<String>,
    /// Keyed by the same `N/tcp` strings as `exposed_ports`.
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    pub publish_all_ports: bool,
    pub binds: Vec<VolumeBind>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
}

/// A running container as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub id: String,
    pub image: String,
}

impl RunningContainer {
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
        }
    }
}

/// First 12 characters of a container id, the way engines print them.
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
