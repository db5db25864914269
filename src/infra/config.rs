use crate::domain::{ContainerSpec, Error, PullCredential, RetryPolicy};
use crate::services::translator::{parse_port, parse_volume};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostfleet/config.json";
pub const DEFAULT_SPEC_DIR: &str = "/etc/hostfleet/conf.d";
pub const DEFAULT_SMTP_PORT: u16 = 587;

pub const CONFIG_TEMPLATE: &str = r#"{
  "log_level"      : "info",
  "check_interval" : 3,
  "engine"         : "docker",
  "engine_timeout" : 30,
  "settle_delay"   : 2,
  "max_attempts"   : 3,
  "auth" : {
    "server_address" : "",
    "username"       : "",
    "password"       : "",
    "email"          : "",
    "match"          : "substring"
  },
  "notification" : {
    "host"      : "",
    "port"      : 587,
    "user"      : "",
    "password"  : "",
    "recipient" : ""
  }
}"#;

pub const SPEC_TEMPLATE: &str = r#"{
  "container_name" : "",
  "image"          : "",
  "instances"      : 1,
  "env"            : {
    "" : ""
  },
  "ports"   : [ "" ],
  "volumes" : [ "" ]
}"#;

const SPEC_EXTENSIONS: [&str; 4] = ["json", "toml", "yml", "yaml"];

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "to")]
    pub recipient: String,
}

impl NotificationConfig {
    fn is_blank(&self) -> bool {
        self.host.trim().is_empty()
            && self.user.trim().is_empty()
            && self.password.is_empty()
            && self.recipient.trim().is_empty()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    #[serde(default)]
    pub log_level: Option<String>,
    /// Seconds between reconciliation passes.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Engine executable, `docker` or `podman`.
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_engine_timeout")]
    pub engine_timeout: u64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub auth: Option<PullCredential>,
    #[serde(default, alias = "smtp")]
    pub notification: Option<NotificationConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            check_interval: default_check_interval(),
            engine: default_engine(),
            engine_timeout: default_engine_timeout(),
            settle_delay: default_settle_delay(),
            max_attempts: default_max_attempts(),
            auth: None,
            notification: None,
        }
    }
}

impl GlobalConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            settle_delay: Duration::from_secs(self.settle_delay),
            max_attempts: self.max_attempts,
        }
    }

    /// Maps `log_level` onto a tracing filter directive.
    pub fn log_filter(&self) -> Option<&'static str> {
        match self.log_level.as_deref()?.trim() {
            "debug" => Some("debug"),
            "info" => Some("info"),
            "warning" | "warn" => Some("warn"),
            "error" => Some("error"),
            _ => None,
        }
    }

    /// Drops `auth` / `notification` blocks that were left blank, like the
    /// ones in the printed template.
    fn normalize(mut self) -> Self {
        if self.auth.as_ref().is_some_and(PullCredential::is_blank) {
            self.auth = None;
        }
        if self
            .notification
            .as_ref()
            .is_some_and(NotificationConfig::is_blank)
        {
            self.notification = None;
        }
        self
    }
}

fn default_check_interval() -> u64 {
    3
}

fn default_engine() -> String {
    "docker".to_string()
}

fn default_engine_timeout() -> u64 {
    30
}

fn default_settle_delay() -> u64 {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

/// Expands `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.to_path_buf(),
    }
}

/// Decodes `content` according to the file extension. Files without an
/// extension are read as JSON.
fn decode<T: DeserializeOwned>(content: &str, path: &Path) -> Result<T> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let parsed: T = match extension.as_str() {
        "toml" => toml::from_str(content).with_context(|| format!("parse de {:?}", path))?,
        "yml" | "yaml" => {
            serde_yml::from_str(content).with_context(|| format!("parse de {:?}", path))?
        }
        _ => serde_json::from_str(content).with_context(|| format!("JSON inválido em {:?}", path))?,
    };

    Ok(parsed)
}

pub fn load_global_config(path: &Path) -> Result<GlobalConfig> {
    if !path.exists() {
        bail!("Arquivo de configuração não encontrado em {:?}", path);
    }

    let content = fs::read_to_string(path).with_context(|| format!("lendo {:?}", path))?;
    let config: GlobalConfig = decode(&content, path)?;

    Ok(config.normalize())
}

/// Validates the global configuration.
pub fn check_global_config(config: &GlobalConfig, source: &Path) -> crate::domain::Result<()> {
    let source_name = source.display().to_string();
    let invalid = |reason: String| Error::validation(source_name.clone(), reason);

    if config.check_interval == 0 {
        return Err(invalid("check_interval deve ser maior que 0".into()));
    }
    if config.engine_timeout == 0 {
        return Err(invalid("engine_timeout deve ser maior que 0".into()));
    }
    if config.max_attempts == 0 {
        return Err(invalid("max_attempts deve ser maior que 0".into()));
    }
    if config.engine.trim().is_empty() {
        return Err(invalid("engine não pode ser vazio".into()));
    }
    if let Some(level) = &config.log_level {
        if config.log_filter().is_none() {
            return Err(invalid(format!(
                "log_level '{level}' inválido (use debug, info, warning ou error)"
            )));
        }
    }

    if let Some(auth) = &config.auth {
        for (field, value) in [
            ("server_address", &auth.server_address),
            ("username", &auth.username),
            ("password", &auth.password),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("auth.{field} é obrigatório")));
            }
        }
    }

    if let Some(notification) = &config.notification {
        for (field, value) in [
            ("host", &notification.host),
            ("user", &notification.user),
            ("recipient", &notification.recipient),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("notification.{field} é obrigatório")));
            }
        }
        if notification.port == 0 {
            return Err(invalid("notification.port deve ser maior que 0".into()));
        }
    }

    Ok(())
}

/// Reads every spec file in `dir`, sorted by file name.
///
/// Hidden files and files with unknown extensions are skipped. Volume
/// source paths have `~` and `$VARS` expanded.
pub fn load_specs(dir: &Path) -> Result<Vec<ContainerSpec>> {
    if !dir.is_dir() {
        bail!("Diretório de specs não encontrado em {:?}", dir);
    }

    info!(" Lendo specs de {:?}", dir);

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listando {:?}", dir))? {
        let path = entry.with_context(|| format!("listando {:?}", dir))?.path();
        if !path.is_file() {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        if file_name.starts_with('.') {
            continue;
        }

        match path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()) {
            Some(ext) if !SPEC_EXTENSIONS.contains(&ext.as_str()) => {
                warn!("  Ignorando {:?} (extensão desconhecida)", path);
                continue;
            }
            _ => paths.push(path),
        }
    }
    paths.sort();

    let mut specs = Vec::with_capacity(paths.len());
    for path in paths {
        debug!("Lendo {:?}", path);
        let content = fs::read_to_string(&path).with_context(|| format!("lendo {:?}", path))?;
        let mut spec: ContainerSpec = decode(&content, &path)?;

        spec.source = path.clone();
        if spec.container_name.as_deref().is_some_and(|n| n.is_empty()) {
            spec.container_name = None;
        }
        spec.volumes = spec.volumes.iter().map(|v| expand_volume(v)).collect();

        debug!("{:?} lido com sucesso", path);
        specs.push(spec);
    }

    Ok(specs)
}

fn expand_volume(raw: &str) -> String {
    match raw.split_once(':') {
        Some((host, rest)) => {
            let host = expand_path(Path::new(host));
            format!("{}:{rest}", host.display())
        }
        None => raw.to_string(),
    }
}

/// Validates every spec, stopping at the first problem.
pub fn check_specs(specs: &[ContainerSpec]) -> crate::domain::Result<()> {
    specs.iter().try_for_each(check_spec)
}

pub fn check_spec(spec: &ContainerSpec) -> crate::domain::Result<()> {
    let invalid = |reason: String| Error::validation(spec.source_name(), reason);

    if spec.instances < 1 {
        return Err(invalid(format!(
            "instances deve ser pelo menos 1: '{}' informado",
            spec.instances
        )));
    }

    if let Some(name) = &spec.container_name {
        if !valid_container_name(name) {
            return Err(invalid(format!(
                "container_name '{name}' deve ter pelo menos 4 caracteres, apenas letras, números e '_'"
            )));
        }
    }

    if !valid_image_reference(&spec.image) {
        return Err(invalid(format!(
            "image '{}' deve ser um nome de imagem padrão, com registry e/ou tag opcionais",
            spec.image
        )));
    }

    for port in &spec.ports {
        parse_port(port).map_err(|e| invalid(e.to_string()))?;
    }

    for volume in &spec.volumes {
        let bind = parse_volume(volume).map_err(|e| invalid(e.to_string()))?;
        if !Path::new(&bind.host_path).exists() {
            return Err(invalid(format!(
                "origem do volume não encontrada: {}",
                bind.host_path
            )));
        }
    }

    for key in spec.env.keys() {
        if key.is_empty() || key.contains('=') {
            return Err(invalid(format!("variável de ambiente inválida: '{key}'")));
        }
    }

    Ok(())
}

fn valid_container_name(name: &str) -> bool {
    name.len() >= 4 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `[registry/][namespace/]name[:tag]`
fn valid_image_reference(image: &str) -> bool {
    let segments: Vec<&str> = image.split('/').collect();
    if segments.is_empty() || segments.len() > 3 {
        return false;
    }

    let (last, leading) = match segments.split_last() {
        Some(split) => split,
        None => return false,
    };

    let (name, tag) = match last.split_once(':') {
        Some((name, tag)) => (name, Some(tag)),
        None => (*last, None),
    };

    let path_chars = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };

    if !path_chars(name) || tag.is_some_and(|t| !path_chars(t)) {
        return false;
    }

    leading.iter().enumerate().all(|(idx, segment)| {
        if idx == 0 && segments.len() > 1 {
            // registry host may carry a port
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        } else {
            path_chars(segment)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_global_config_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let config = load_global_config(&path).unwrap();
        assert_eq!(config, GlobalConfig::default());
        assert_eq!(config.check_interval(), Duration::from_secs(3));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn parses_full_global_config() {
        let json = r#"{
            "log_level": "warning",
            "check_interval": 10,
            "engine": "podman",
            "auth": {
                "serveraddress": "https://reg.example.com/v1/",
                "username": "deploy",
                "password": "pw",
                "email": "ops@example.com"
            },
            "smtp": {
                "host": "mail.example.com",
                "user": "alerts@example.com",
                "password": "pw",
                "to": "ops@example.com"
            }
        }"#;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, json).unwrap();

        let config = load_global_config(&path).unwrap();
        assert_eq!(config.check_interval, 10);
        assert_eq!(config.engine, "podman");
        assert_eq!(config.log_filter(), Some("warn"));
        assert_eq!(
            config.auth.as_ref().unwrap().server_address,
            "https://reg.example.com/v1/"
        );
        let notification = config.notification.as_ref().unwrap();
        assert_eq!(notification.port, DEFAULT_SMTP_PORT);
        assert_eq!(notification.recipient, "ops@example.com");
        assert!(check_global_config(&config, &path).is_ok());
    }

    #[test]
    fn printed_template_is_valid_once_blank_blocks_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, CONFIG_TEMPLATE).unwrap();

        let config = load_global_config(&path).unwrap();
        assert!(config.auth.is_none());
        assert!(config.notification.is_none());
        assert!(check_global_config(&config, &path).is_ok());
    }

    #[test]
    fn reads_toml_global_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "check_interval = 5\nengine = \"podman\"\n").unwrap();

        let config = load_global_config(&path).unwrap();
        assert_eq!(config.check_interval, 5);
        assert_eq!(config.engine, "podman");
    }

    #[test]
    fn rejects_zero_check_interval() {
        let config = GlobalConfig {
            check_interval: 0,
            ..Default::default()
        };
        let err = check_global_config(&config, Path::new("config.json")).unwrap_err();
        assert!(err.to_string().contains("check_interval"));
    }

    #[test]
    fn rejects_partial_auth() {
        let config = GlobalConfig {
            auth: Some(PullCredential {
                server_address: "reg.example.com".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = check_global_config(&config, Path::new("config.json")).unwrap_err();
        assert!(err.to_string().contains("auth.username"));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let config = GlobalConfig {
            log_level: Some("verbose".into()),
            ..Default::default()
        };
        assert!(check_global_config(&config, Path::new("config.json")).is_err());
    }

    #[test]
    fn missing_global_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = load_global_config(&temp.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("não encontrado"));
    }

    #[test]
    fn loads_specs_sorted_and_skips_noise() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("b-web.json"),
            r#"{"image": "nginx:latest", "instances": 2, "ports": ["8080:80"]}"#,
        )
        .unwrap();
        fs::write(
            temp.path().join("a-cache.yml"),
            "image: redis:7\ninstances: 1\nenv:\n  MODE: cache\n",
        )
        .unwrap();
        fs::write(
            temp.path().join("c-db.toml"),
            "image = \"postgres:16\"\ninstances = 1\ncontainer_name = \"\"\n",
        )
        .unwrap();
        fs::write(temp.path().join(".hidden.json"), "not json").unwrap();
        fs::write(temp.path().join("README.md"), "# notes").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();

        let specs = load_specs(temp.path()).unwrap();
        let images: Vec<&str> = specs.iter().map(|s| s.image.as_str()).collect();
        assert_eq!(images, vec!["redis:7", "nginx:latest", "postgres:16"]);
        assert_eq!(specs[0].env.get("MODE").map(String::as_str), Some("cache"));
        assert_eq!(specs[1].source_name(), "b-web.json");
        assert_eq!(specs[2].container_name, None);
    }

    #[test]
    fn invalid_spec_json_names_the_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.json"), "{ image: ").unwrap();

        let err = load_specs(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }

    #[test]
    fn missing_spec_dir_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(load_specs(&temp.path().join("conf.d")).is_err());
    }

    #[test]
    fn expands_volume_sources() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        fs::create_dir(&data).unwrap();
        unsafe {
            std::env::set_var("HOSTFLEET_TEST_DATA", &data);
        }
        fs::write(
            temp.path().join("app.json"),
            r#"{"image": "app", "instances": 1, "volumes": ["$HOSTFLEET_TEST_DATA:/data:ro"]}"#,
        )
        .unwrap();

        let specs = load_specs(temp.path()).unwrap();
        assert_eq!(specs[0].volumes, vec![format!("{}:/data:ro", data.display())]);
        assert!(check_spec(&specs[0]).is_ok());
    }

    #[test]
    fn validates_instances() {
        let spec = ContainerSpec::new("nginx", 0);
        let err = check_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("pelo menos 1"));
    }

    #[test]
    fn validates_container_name() {
        assert!(check_spec(&ContainerSpec::new("nginx", 1).with_name("web_1")).is_ok());
        assert!(check_spec(&ContainerSpec::new("nginx", 1).with_name("web")).is_err());
        assert!(check_spec(&ContainerSpec::new("nginx", 1).with_name("web-front")).is_err());
    }

    #[test]
    fn validates_image_reference() {
        for good in [
            "nginx",
            "nginx:1.25",
            "library/nginx:latest",
            "myregistry.example.com/team/app:1.2",
            "registry.local:5000/app",
        ] {
            assert!(valid_image_reference(good), "{good}");
        }
        for bad in ["", "a/b/c/d", "nginx:", "bad image", "reg.example.com//app", "x:y:z"] {
            assert!(!valid_image_reference(bad), "{bad}");
        }
    }

    #[test]
    fn validates_ports_and_volumes() {
        let bad_port = ContainerSpec::new("nginx", 1).with_ports(["80:http"]);
        assert!(check_spec(&bad_port).unwrap_err().to_string().contains("porta"));

        let missing_source =
            ContainerSpec::new("nginx", 1).with_volumes(["/definitely/not/here:/data"]);
        assert!(
            check_spec(&missing_source)
                .unwrap_err()
                .to_string()
                .contains("não encontrada")
        );
    }

    #[test]
    fn rejects_bad_env_keys() {
        let spec = ContainerSpec::new("nginx", 1).with_env("", "x");
        assert!(check_spec(&spec).is_err());
    }
}
