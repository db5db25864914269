use crate::domain::{ContainerEngine, ContainerSpec, NotificationSink};
use crate::infra::config::{GlobalConfig, check_global_config, check_specs, load_specs};
use crate::infra::{CliEngine, LogNotifier, MailNotifier};
use crate::services::{ImageService, Reconciler, Ticker, build_groups};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Startup sequence and steady-state loop of the supervisor.
///
/// Everything up to [`Supervisor::prepare`] is fatal on error; once the
/// reconciler runs, failures are logged and retried on the next tick.
pub struct Supervisor {
    config: GlobalConfig,
    config_path: PathBuf,
    specs: Vec<ContainerSpec>,
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn NotificationSink>,
}

impl Supervisor {
    /// Reads the spec directory and wires the engine CLI and notifier that
    /// `config` describes. `config_path` is only used in messages.
    pub fn new(config: GlobalConfig, config_path: &Path, spec_dir: &Path) -> Result<Self> {
        let specs = load_specs(spec_dir)?;

        let engine = CliEngine::new(config.engine.clone(), config.engine_timeout());
        if !engine.is_available() {
            bail!(
                "Engine '{}' não encontrada no PATH (ajuste 'engine' em {:?})",
                engine.program(),
                config_path
            );
        }

        let notifier: Arc<dyn NotificationSink> = match &config.notification {
            Some(mail) => {
                info!("Configuração SMTP encontrada ({})", mail.host);
                Arc::new(MailNotifier::new(mail.clone(), config.engine_timeout())?)
            }
            None => {
                warn!("  Nenhuma configuração de notificação; alertas irão apenas para o log");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::with_engine(
            config,
            config_path,
            specs,
            Arc::new(engine),
            notifier,
        ))
    }

    /// Builds a supervisor over an already loaded configuration and an
    /// injected engine and notifier.
    pub fn with_engine(
        config: GlobalConfig,
        config_path: &Path,
        specs: Vec<ContainerSpec>,
        engine: Arc<dyn ContainerEngine>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            config_path: config_path.to_path_buf(),
            specs,
            engine,
            notifier,
        }
    }

    fn image_service(&self) -> ImageService {
        ImageService::new(self.engine.clone(), self.config.auth.clone())
    }

    /// Validates everything that can be validated without starting
    /// containers: config values, every spec, the notifier and the
    /// registry credential.
    pub fn check(&self) -> Result<()> {
        check_global_config(&self.config, &self.config_path)?;
        info!("✅ Configuração global válida");

        if self.specs.is_empty() {
            warn!("  Nenhuma spec encontrada; nada a supervisionar");
        }
        check_specs(&self.specs)?;
        info!("✅ {} spec(s) válida(s)", self.specs.len());

        self.notifier
            .check()
            .context("Falha ao verificar o servidor de notificação")?;

        self.image_service()
            .check_auth()
            .context("Falha ao autenticar no registry")?;

        Ok(())
    }

    /// Pulls every image and builds the reconciler over the translated groups.
    pub fn prepare(&self) -> Result<Reconciler> {
        self.image_service()
            .sync_images(&self.specs)
            .context("Falha ao sincronizar imagens")?;

        let groups = build_groups(self.specs.clone())?;
        Ok(Reconciler::new(
            self.engine.clone(),
            self.notifier.clone(),
            groups,
            self.config.retry_policy(),
        ))
    }

    /// Runs the full startup sequence, then reconciles forever.
    pub fn run(self) -> Result<()> {
        self.check()?;
        let mut reconciler = self.prepare()?;

        let mut ticker = Ticker::new(self.config.check_interval());
        info!(
            "🚀 Supervisionando {} grupo(s) a cada {:?}",
            reconciler.groups().len(),
            ticker.period()
        );
        reconciler.run(&mut ticker)
    }
}
