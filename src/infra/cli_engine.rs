use crate::domain::{
    ContainerEngine, CreateOptions, Error, ImageReference, PullCredential, Result,
    RunningContainer,
};
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PS_FORMAT: &str = "{{.ID}}\t{{.Image}}";

/// Drives `docker` or `podman` through its command line. Every call is
/// bounded by `timeout`; a call that overruns is killed.
#[derive(Debug, Clone)]
pub struct CliEngine {
    program: String,
    timeout: Duration,
}

struct CommandOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// Last non-empty stderr line, or the exit status.
    fn reason(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| format!("status {:?}", self.status.code()))
    }
}

impl CliEngine {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True when the engine executable answers `--version`.
    pub fn is_available(&self) -> bool {
        command_available(&self.program)
    }

    fn run(&self, args: &[String], stdin: Option<&str>) -> std::io::Result<RunOutcome> {
        debug!("{} {}", self.program, args.join(" "));
        run_with_timeout(&self.program, args, stdin, self.timeout)
    }

    /// Runs `args` and returns stdout, mapping failures with `make_error`.
    fn execute(
        &self,
        args: Vec<String>,
        stdin: Option<&str>,
        make_error: impl Fn(String) -> Error,
    ) -> Result<String> {
        let outcome = self
            .run(&args, stdin)
            .map_err(|e| make_error(format!("executando {}: {e}", self.program)))?;

        match outcome {
            RunOutcome::Finished(output) if output.status.success() => Ok(output.stdout),
            RunOutcome::Finished(output) => Err(make_error(output.reason())),
            RunOutcome::TimedOut => Err(Error::Timeout {
                operation: format!("{} {}", self.program, args.join(" ")),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    fn login(&self, credential: &PullCredential) -> Result<()> {
        let args = login_args(credential);
        self.execute(args, Some(&credential.password), |reason| Error::Auth {
            server: credential.server_address.clone(),
            reason,
        })
        .map(|_| ())
    }
}

enum RunOutcome {
    Finished(CommandOutput),
    TimedOut,
}

impl ContainerEngine for CliEngine {
    fn list_running(&self) -> Result<Vec<RunningContainer>> {
        let args = vec![
            "ps".to_string(),
            "--no-trunc".to_string(),
            "--format".to_string(),
            PS_FORMAT.to_string(),
        ];
        let stdout = self.execute(args, None, Error::List)?;
        Ok(parse_ps_output(&stdout))
    }

    fn create(&self, options: &CreateOptions) -> Result<String> {
        let stdout = self.execute(create_args(options), None, |reason| Error::Create {
            image: options.image.clone(),
            reason,
        })?;

        stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Create {
                image: options.image.clone(),
                reason: "engine não retornou o id do container".into(),
            })
    }

    fn start(&self, id: &str) -> Result<()> {
        let args = vec!["start".to_string(), id.to_string()];
        self.execute(args, None, |reason| Error::Start {
            id: id.to_string(),
            reason,
        })
        .map(|_| ())
    }

    fn pull(&self, image: &ImageReference, credential: Option<&PullCredential>) -> Result<()> {
        if let Some(credential) = credential {
            self.login(credential).map_err(|e| Error::Pull {
                reference: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        let args = vec!["pull".to_string(), image.to_string()];
        self.execute(args, None, |reason| Error::Pull {
            reference: image.to_string(),
            reason,
        })
        .map(|_| ())
    }

    fn auth_check(&self, credential: &PullCredential) -> Result<()> {
        self.login(credential)
    }
}

pub fn command_available(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// `create` arguments for `options`, image last.
pub fn create_args(options: &CreateOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into()];

    if let Some(name) = &options.name {
        args.push("--name".into());
        args.push(name.clone());
    }

    for port in &options.exposed_ports {
        args.push("--expose".into());
        args.push(port.clone());
    }

    for (port, bindings) in &options.port_bindings {
        for binding in bindings {
            args.push("-p".into());
            args.push(format!("{binding}:{port}"));
        }
    }

    if options.publish_all_ports {
        args.push("-P".into());
    }

    for bind in &options.binds {
        args.push("-v".into());
        args.push(bind.to_string());
    }

    for env in &options.env {
        args.push("-e".into());
        args.push(env.clone());
    }

    args.push(options.image.clone());
    args
}

fn login_args(credential: &PullCredential) -> Vec<String> {
    vec![
        "login".into(),
        "--username".into(),
        credential.username.clone(),
        "--password-stdin".into(),
        credential.server_address.clone(),
    ]
}

/// Parses `ps --format '{{.ID}}\t{{.Image}}'` output.
pub fn parse_ps_output(stdout: &str) -> Vec<RunningContainer> {
    stdout
        .lines()
        .filter_map(|line| {
            let (id, image) = line.trim().split_once('\t')?;
            let (id, image) = (id.trim(), image.trim());
            if id.is_empty() || image.is_empty() {
                return None;
            }
            Some(RunningContainer::new(id, image))
        })
        .collect()
}

/// Spawns `program`, feeds it `stdin` and waits at most `timeout`.
fn run_with_timeout(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
    timeout: Duration,
) -> std::io::Result<RunOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        match pipe.write_all(input.as_bytes()) {
            Ok(()) => {}
            // child exited without reading everything; its status tells why
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
    }

    wait_with_timeout(child, timeout)
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> std::io::Result<RunOutcome> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // drain pipes concurrently so a chatty child cannot block on a full pipe
    let stdout_reader = thread::spawn(move || read_all(stdout));
    let stderr_reader = thread::spawn(move || read_all(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let Some(status) = status else {
        // a grandchild may still hold the pipes open; leave the readers behind
        return Ok(RunOutcome::TimedOut);
    };

    Ok(RunOutcome::Finished(CommandOutput {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    }))
}

fn read_all<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContainerSpec;
    use crate::services::translate;

    #[test]
    fn renders_create_arguments() {
        let spec = ContainerSpec::new("nginx:latest", 1)
            .with_name("web_front")
            .with_ports(["80", "127.0.0.1:8443:443"])
            .with_volumes(["/srv/www:/usr/share/nginx/html:ro"])
            .with_env("MODE", "prod");
        let options = translate(&spec).unwrap();

        let args = create_args(&options);
        assert_eq!(
            args,
            vec![
                "create",
                "--name",
                "web_front",
                "--expose",
                "443/tcp",
                "--expose",
                "80/tcp",
                "-p",
                "127.0.0.1:8443:443/tcp",
                "-P",
                "-v",
                "/srv/www:/usr/share/nginx/html:ro",
                "-e",
                "MODE=prod",
                "nginx:latest",
            ]
        );
    }

    #[test]
    fn binding_on_all_interfaces_omits_ip() {
        let options = translate(&ContainerSpec::new("nginx", 2).with_ports(["8080:80"])).unwrap();
        let args = create_args(&options);
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "8080:80/tcp"));
        assert!(!args.contains(&"-P".to_string()));
    }

    #[test]
    fn parses_ps_lines() {
        let out = "abc123\tnginx:latest\n\ndef456\tredis\nmalformed-line\n";
        let containers = parse_ps_output(out);
        assert_eq!(
            containers,
            vec![
                RunningContainer::new("abc123", "nginx:latest"),
                RunningContainer::new("def456", "redis"),
            ]
        );
    }

    #[test]
    fn login_reads_password_from_stdin() {
        let credential = PullCredential {
            server_address: "reg.example.com".into(),
            username: "deploy".into(),
            password: "pw".into(),
            ..Default::default()
        };
        let args = login_args(&credential);
        assert!(!args.contains(&"pw".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("reg.example.com"));
    }

    #[test]
    fn missing_program_reports_operation_error() {
        let engine = CliEngine::new("hostfleet-no-such-engine", Duration::from_secs(1));
        assert!(!engine.is_available());
        let err = engine.list_running().unwrap_err();
        assert!(matches!(err, Error::List(_)));
    }

    #[cfg(unix)]
    #[test]
    fn kills_calls_that_overrun() {
        let child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let start = Instant::now();
        let outcome = wait_with_timeout(child, Duration::from_millis(100)).unwrap();
        assert!(matches!(outcome, RunOutcome::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_not_held_up_by_grandchildren() {
        let args = vec!["-c".to_string(), "sleep 5 & sleep 5".to_string()];

        let start = Instant::now();
        let outcome = run_with_timeout("sh", &args, None, Duration::from_millis(200)).unwrap();
        assert!(matches!(outcome, RunOutcome::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn child_that_ignores_stdin_is_still_reaped() {
        // larger than any pipe buffer, so the write hits a closed pipe
        let input = "x".repeat(4 * 1024 * 1024);

        let outcome = run_with_timeout("true", &[], Some(&input), Duration::from_secs(5)).unwrap();
        match outcome {
            RunOutcome::Finished(output) => assert!(output.status.success()),
            RunOutcome::TimedOut => panic!("true timed out"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn collects_output_of_finished_calls() {
        let child = Command::new("echo")
            .arg("ready")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        match wait_with_timeout(child, Duration::from_secs(5)).unwrap() {
            RunOutcome::Finished(output) => {
                assert!(output.status.success());
                assert_eq!(output.stdout.trim(), "ready");
            }
            RunOutcome::TimedOut => panic!("echo timed out"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_surfaces_stderr() {
        // `ls start <id>` fails with a message on stderr
        let engine = CliEngine::new("ls", Duration::from_secs(5));
        let err = engine.start("/hostfleet/definitely/missing").unwrap_err();
        match err {
            Error::Start { id, reason } => {
                assert_eq!(id, "/hostfleet/definitely/missing");
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
