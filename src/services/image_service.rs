use crate::domain::{
    ContainerEngine, ContainerSpec, ImageReference, PullCredential, Result, select_credential,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry-facing startup work: credential check and image pre-sync.
pub struct ImageService {
    engine: Arc<dyn ContainerEngine>,
    credential: Option<PullCredential>,
}

impl ImageService {
    pub fn new(engine: Arc<dyn ContainerEngine>, credential: Option<PullCredential>) -> Self {
        Self { engine, credential }
    }

    /// Logs in with the configured credential, if there is one.
    pub fn check_auth(&self) -> Result<()> {
        let Some(credential) = &self.credential else {
            return Ok(());
        };

        info!(" Credencial encontrada para {}", credential.server_address);
        self.engine.auth_check(credential)?;
        info!(" Autenticação verificada");
        Ok(())
    }

    /// Pulls `reference`, attaching the credential only when it matches
    /// the reference's registry.
    pub fn pull(&self, reference: &str) -> Result<ImageReference> {
        let image = ImageReference::parse(reference);
        let credential = select_credential(&image, self.credential.as_ref());

        if credential.is_some() {
            debug!("Usando credencial para {}", image.registry);
        }

        info!(" Baixando {image}...");
        self.engine.pull(&image, credential)?;
        info!(" {image} atualizada");

        Ok(image)
    }

    /// Pulls every distinct image named by `specs`, stopping at the first
    /// failure.
    pub fn sync_images(&self, specs: &[ContainerSpec]) -> Result<Vec<ImageReference>> {
        let mut seen = HashSet::new();
        let mut pulled = Vec::new();

        for spec in specs {
            if !seen.insert(spec.image.as_str()) {
                debug!("{} já sincronizada", spec.image);
                continue;
            }
            pulled.push(self.pull(&spec.image)?);
        }

        Ok(pulled)
    }
}
