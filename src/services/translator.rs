use crate::domain::{
    ContainerSpec, CreateOptions, Error, Group, PortBinding, Result, VolumeBind,
};
use std::net::IpAddr;

/// Port and volume strings, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortMapping {
    /// `N`: published on an ephemeral host port.
    Exposed { container_port: u16 },
    /// `H:N` or `IP:H:N`.
    Bound {
        container_port: u16,
        binding: PortBinding,
    },
}

impl PortMapping {
    pub fn container_port(&self) -> u16 {
        match self {
            Self::Exposed { container_port } | Self::Bound { container_port, .. } => {
                *container_port
            }
        }
    }
}

/// Builds the creation parameters for `spec`.
///
/// Every port ends up in the exposed set; explicit bindings are added to
/// the binding map as well, and a bare `N` turns on publish-all.
pub fn translate(spec: &ContainerSpec) -> Result<CreateOptions> {
    let mut options = CreateOptions {
        name: spec.container_name.clone(),
        image: spec.image.clone(),
        ..Default::default()
    };

    for port in &spec.ports {
        let mapping = parse_port(port)?;
        let key = format!("{}/tcp", mapping.container_port());
        options.exposed_ports.insert(key.clone());

        match mapping {
            PortMapping::Exposed { .. } => options.publish_all_ports = true,
            PortMapping::Bound { binding, .. } => {
                options.port_bindings.entry(key).or_default().push(binding)
            }
        }
    }

    for volume in &spec.volumes {
        options.binds.push(parse_volume(volume)?);
    }

    // BTreeMap iteration keeps the list sorted by key
    options.env = spec
        .env
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    Ok(options)
}

/// Translates every spec once and wraps it into a fresh, active group.
pub fn build_groups(specs: Vec<ContainerSpec>) -> Result<Vec<Group>> {
    specs
        .into_iter()
        .map(|spec| {
            let options = translate(&spec)?;
            Ok(Group::new(spec, options))
        })
        .collect()
}

pub fn parse_port(raw: &str) -> Result<PortMapping> {
    let malformed = || Error::MalformedPortSpec(raw.to_string());
    let parts: Vec<&str> = raw.trim().split(':').collect();

    match parts.as_slice() {
        [container] => Ok(PortMapping::Exposed {
            container_port: port_number(container).ok_or_else(malformed)?,
        }),
        [host, container] => Ok(PortMapping::Bound {
            container_port: port_number(container).ok_or_else(malformed)?,
            binding: PortBinding {
                host_ip: None,
                host_port: port_number(host).ok_or_else(malformed)?,
            },
        }),
        [ip, host, container] => {
            let ip: IpAddr = ip.parse().map_err(|_| malformed())?;
            Ok(PortMapping::Bound {
                container_port: port_number(container).ok_or_else(malformed)?,
                binding: PortBinding {
                    host_ip: Some(ip.to_string()),
                    host_port: port_number(host).ok_or_else(malformed)?,
                },
            })
        }
        _ => Err(malformed()),
    }
}

pub fn parse_volume(raw: &str) -> Result<VolumeBind> {
    let malformed = || Error::MalformedVolumeSpec(raw.to_string());
    let parts: Vec<&str> = raw.trim().split(':').collect();

    let (host, container, read_only) = match parts.as_slice() {
        [host, container] => (*host, *container, false),
        [host, container, "rw"] => (*host, *container, false),
        [host, container, "ro"] => (*host, *container, true),
        _ => return Err(malformed()),
    };

    if host.is_empty() || container.is_empty() {
        return Err(malformed());
    }

    Ok(VolumeBind {
        host_path: host.to_string(),
        container_path: container.to_string(),
        read_only,
    })
}

fn port_number(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u16>().ok().filter(|p| *p > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_with_ports(ports: &[&str]) -> ContainerSpec {
        ContainerSpec::new("nginx:latest", 1).with_ports(ports.iter().copied())
    }

    #[test]
    fn bare_port_is_exposed_and_published() {
        let options = translate(&spec_with_ports(&["80"])).unwrap();
        assert!(options.exposed_ports.contains("80/tcp"));
        assert!(options.publish_all_ports);
        assert!(options.port_bindings.is_empty());
    }

    #[test]
    fn host_port_binds_on_all_interfaces() {
        let options = translate(&spec_with_ports(&["8080:80"])).unwrap();
        assert!(options.exposed_ports.contains("80/tcp"));
        assert!(!options.publish_all_ports);
        assert_eq!(
            options.port_bindings["80/tcp"],
            vec![PortBinding {
                host_ip: None,
                host_port: 8080
            }]
        );
    }

    #[test]
    fn ip_host_port_binds_on_interface() {
        let options = translate(&spec_with_ports(&["127.0.0.1:8080:80"])).unwrap();
        assert!(options.exposed_ports.contains("80/tcp"));
        assert_eq!(
            options.port_bindings["80/tcp"],
            vec![PortBinding {
                host_ip: Some("127.0.0.1".into()),
                host_port: 8080
            }]
        );
    }

    #[test]
    fn mixed_ports_keep_exposed_set_and_bindings_consistent() {
        let options =
            translate(&spec_with_ports(&["443", "8080:80", "127.0.0.1:9090:80"])).unwrap();

        assert_eq!(options.exposed_ports.len(), 2);
        assert!(options.publish_all_ports);
        assert_eq!(options.port_bindings["80/tcp"].len(), 2);
        for key in options.port_bindings.keys() {
            assert!(options.exposed_ports.contains(key));
        }
    }

    #[test]
    fn volumes_default_to_read_write() {
        let spec = ContainerSpec::new("app", 1).with_volumes(["/data:/app/data"]);
        let options = translate(&spec).unwrap();
        assert!(!options.binds[0].read_only);
        assert_eq!(options.binds[0].to_string(), "/data:/app/data:rw");
    }

    #[test]
    fn ro_volume_is_read_only() {
        let spec = ContainerSpec::new("app", 1).with_volumes(["/data:/app/data:ro"]);
        let options = translate(&spec).unwrap();
        assert!(options.binds[0].read_only);
    }

    #[test]
    fn env_is_flattened() {
        let spec = ContainerSpec::new("app", 1)
            .with_env("B", "2")
            .with_env("A", "1=one");
        let options = translate(&spec).unwrap();
        assert_eq!(options.env, vec!["A=1=one".to_string(), "B=2".to_string()]);
    }

    #[test]
    fn translation_is_deterministic() {
        let spec = ContainerSpec::new("app", 3)
            .with_name("app_main")
            .with_ports(["80", "8443:443"])
            .with_volumes(["/srv:/srv:ro"])
            .with_env("X", "1");
        assert_eq!(translate(&spec).unwrap(), translate(&spec).unwrap());
        assert_eq!(translate(&spec).unwrap().name.as_deref(), Some("app_main"));
    }

    #[test]
    fn groups_keep_desired_count_and_order() {
        let groups = build_groups(vec![
            ContainerSpec::new("b", 2),
            ContainerSpec::new("a", 1),
        ])
        .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].image(), "b");
        assert_eq!(groups[0].desired(), 2);
        assert_eq!(groups[1].desired(), 1);
        assert!(groups.iter().all(|g| g.state.is_active()));
    }

    #[test]
    fn build_groups_fails_on_bad_port() {
        let err = build_groups(vec![ContainerSpec::new("a", 1).with_ports(["x:80"])]).unwrap_err();
        assert!(matches!(err, Error::MalformedPortSpec(_)));
    }

    #[test]
    fn rejects_malformed_ports() {
        for bad in ["", "http", "0", "70000", "1:2:3:4", "localhost:80:80", "8080:"] {
            let err = parse_port(bad).unwrap_err();
            assert!(matches!(err, Error::MalformedPortSpec(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_malformed_volumes() {
        for bad in ["/data", "/data:/app:rx", ":/app", "/data:", "/a:/b:ro:rw"] {
            let err = parse_volume(bad).unwrap_err();
            assert!(matches!(err, Error::MalformedVolumeSpec(_)), "{bad}");
        }
    }
}
