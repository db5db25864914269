use crate::domain::{
    ContainerEngine, Error, Group, GroupStatus, ImageReference, NotificationSink, Result,
    RetryPolicy, RunningContainer, Transition, short_id,
};
use crate::services::Ticker;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Running containers counted by image, built from one list call.
///
/// Keys are canonical references, so `nginx` in a spec matches the
/// `docker.io/library/nginx:latest` that Podman reports.
#[derive(Debug, Default, Clone)]
pub struct RunningIndex {
    counts: HashMap<String, usize>,
}

impl RunningIndex {
    pub fn count(&self, image: &str) -> usize {
        self.counts
            .get(&ImageReference::parse(image).canonical())
            .copied()
            .unwrap_or(0)
    }
}

impl From<Vec<RunningContainer>> for RunningIndex {
    fn from(containers: Vec<RunningContainer>) -> Self {
        let mut counts = HashMap::new();
        for container in containers {
            let key = ImageReference::parse(&container.image).canonical();
            *counts.entry(key).or_insert(0) += 1;
        }
        Self { counts }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Containers created, started and confirmed running.
    pub started: usize,
    pub failed_verifications: usize,
    /// List, create or start calls that failed.
    pub engine_errors: usize,
    pub skipped_suspended: usize,
    /// Images whose group was suspended during this tick.
    pub newly_suspended: Vec<String>,
}

/// Keeps the declared number of containers running for every group.
///
/// Owns the groups; their state is only ever changed from `tick`, which
/// takes `&mut self`, so passes can never overlap.
pub struct Reconciler {
    engine: Arc<dyn ContainerEngine>,
    notifier: Arc<dyn NotificationSink>,
    groups: Vec<Group>,
    policy: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        notifier: Arc<dyn NotificationSink>,
        groups: Vec<Group>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            notifier,
            groups,
            policy,
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Runs one pass over every group in declaration order.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        debug!("Verificando se os containers necessários estão rodando");

        let running = match self.engine.list_running() {
            Ok(list) => RunningIndex::from(list),
            Err(e) => {
                error!("  {}", e);
                report.engine_errors += 1;
                return report;
            }
        };

        let Self {
            engine,
            notifier,
            groups,
            policy,
        } = self;

        for group in groups.iter_mut() {
            reconcile_group(
                engine.as_ref(),
                notifier.as_ref(),
                policy,
                group,
                &running,
                &mut report,
            );
        }

        report
    }

    /// Ticks forever on `ticker`'s schedule.
    pub fn run(&mut self, ticker: &mut Ticker) -> ! {
        loop {
            let dropped = ticker.wait();
            if dropped > 0 {
                warn!(
                    "  Ciclo anterior excedeu o intervalo; {} verificação(ões) descartada(s)",
                    dropped
                );
            }

            let report = self.tick();
            if report.started > 0 || report.failed_verifications > 0 || report.engine_errors > 0
            {
                debug!(?report, "Ciclo concluído");
            }
        }
    }
}

fn reconcile_group(
    engine: &dyn ContainerEngine,
    notifier: &dyn NotificationSink,
    policy: &RetryPolicy,
    group: &mut Group,
    running: &RunningIndex,
    report: &mut TickReport,
) {
    let image = group.image().to_string();

    if group.state.status() == GroupStatus::Suspended {
        debug!("{} {}", group.state.status(), image);
        report.skipped_suspended += 1;
        return;
    }

    let mut count = running.count(&image);
    let desired = group.desired();
    debug!("{} de {} containers {} rodando", count, desired, image);

    while count < desired {
        match start_one(engine, policy, group, count) {
            Ok(observed) => {
                group.state.record_success();
                report.started += 1;
                count = observed;
            }
            Err(Error::SoftStartVerification { .. }) => {
                report.failed_verifications += 1;
                match group.state.record_failure(policy) {
                    Transition::Retrying { attempts } => {
                        warn!(
                            "  {} não subiu (tentativa {} de {})",
                            image, attempts, policy.max_attempts
                        );
                    }
                    Transition::Suspended { attempts } => {
                        error!(
                            " {} SUSPENSO após {} falhas ao iniciar",
                            image, attempts
                        );
                        report.newly_suspended.push(image.clone());
                        warn!(" Enviando alerta de suspensão para {}", image);
                        if let Err(e) = notifier.notify(&image) {
                            error!("  {}", e);
                        }
                    }
                }
                return;
            }
            Err(e) => {
                error!("  {}", e);
                report.engine_errors += 1;
                return;
            }
        }
    }
}

/// Creates and starts one container, then recounts after the settle delay.
/// Returns the new running count when it went up by exactly one.
fn start_one(
    engine: &dyn ContainerEngine,
    policy: &RetryPolicy,
    group: &Group,
    before: usize,
) -> Result<usize> {
    let options = group.options_for_create();

    info!(" Criando novo container de {}", options.image);
    let id = engine.create(&options)?;
    info!(" Criado {}", short_id(&id));

    info!(" Iniciando {}", short_id(&id));
    engine.start(&id)?;

    if !policy.settle_delay.is_zero() {
        thread::sleep(policy.settle_delay);
    }

    let observed = RunningIndex::from(engine.list_running()?).count(&options.image);
    if observed != before + 1 {
        return Err(Error::SoftStartVerification {
            image: options.image,
            expected: before + 1,
            observed,
        });
    }

    info!(" {} rodando", short_id(&id));
    Ok(observed)
}
