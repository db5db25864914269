use serde::Deserialize;
use std::fmt;

pub const DEFAULT_TAG: &str = "latest";

/// Hosts that name Docker Hub; references on them are shortened by `canonical`.
const DOCKER_HUB_HOSTS: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];
const OFFICIAL_NAMESPACE: &str = "library/";

/// An image reference split into the parts a pull needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, empty when the reference has no DNS-like first segment.
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Splits `reference` into registry, repository and tag.
    ///
    /// The first `/`-separated segment is a registry only if it contains a
    /// `.`; the tag comes from a `:` in the last segment and defaults to
    /// `latest`.
    pub fn parse(reference: &str) -> Self {
        let (registry, path) = match reference.split_once('/') {
            Some((first, rest)) if first.contains('.') => (first.to_string(), rest),
            _ => (String::new(), reference),
        };

        let (prefix, last) = match path.rsplit_once('/') {
            Some((prefix, last)) => (Some(prefix), last),
            None => (None, path),
        };

        let (name, tag) = match last.split_once(':') {
            Some((name, tag)) => (name, tag.to_string()),
            None => (last, DEFAULT_TAG.to_string()),
        };

        let repository = match prefix {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        };

        Self {
            registry,
            repository,
            tag,
        }
    }

    /// Shortest spelling of this reference. Engines disagree on how they
    /// report Docker Hub images (`nginx` vs `docker.io/library/nginx:latest`),
    /// so running containers are compared on this form.
    pub fn canonical(&self) -> String {
        let on_hub = self.registry.is_empty() || DOCKER_HUB_HOSTS.contains(&self.registry.as_str());
        if !on_hub {
            return self.to_string();
        }

        let repository = self
            .repository
            .strip_prefix(OFFICIAL_NAMESPACE)
            .unwrap_or(&self.repository);
        format!("{repository}:{}", self.tag)
    }

    /// Repository including the registry host, without the tag.
    pub fn qualified_repository(&self) -> String {
        if self.registry.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.registry, self.repository)
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.qualified_repository(), self.tag)
    }
}

/// How a stored credential is matched against a registry host.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMatch {
    /// `server_address` merely contains the registry host.
    #[default]
    Substring,
    /// `server_address`, stripped of scheme and path, equals the registry host.
    Host,
}

/// Registry login loaded from the global configuration.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PullCredential {
    #[serde(default, alias = "serveraddress")]
    pub server_address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "match")]
    pub match_mode: CredentialMatch,
}

impl fmt::Debug for PullCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullCredential")
            .field("server_address", &self.server_address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("match_mode", &self.match_mode)
            .finish()
    }
}

impl PullCredential {
    /// True when the block was present in the config but left blank.
    pub fn is_blank(&self) -> bool {
        self.server_address.trim().is_empty()
            && self.username.trim().is_empty()
            && self.password.is_empty()
            && self.email.trim().is_empty()
    }

    /// Host part of `server_address` (`https://host:5000/v1/` -> `host:5000`).
    pub fn server_host(&self) -> &str {
        let address = self.server_address.trim();
        let without_scheme = address
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(address);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }

    pub fn matches(&self, registry: &str) -> bool {
        if registry.is_empty() {
            return false;
        }
        match self.match_mode {
            CredentialMatch::Substring => self.server_address.contains(registry),
            CredentialMatch::Host => self.server_host().eq_ignore_ascii_case(registry),
        }
    }
}

/// Returns the credential to attach when pulling `image`, if any.
pub fn select_credential<'a>(
    image: &ImageReference,
    credential: Option<&'a PullCredential>,
) -> Option<&'a PullCredential> {
    credential.filter(|c| c.matches(&image.registry))
}
