//! Error taxonomy for the supervisor core.
//!
//! Startup code turns any of these into a fatal error. Inside the
//! reconciliation loop only [`Error::SoftStartVerification`] affects group
//! state; engine failures are logged and retried on the next tick.

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration
    // =========================================================================
    /// A spec or the global configuration failed validation.
    #[error("configuração inválida em {source_name}: {reason}")]
    Validation { source_name: String, reason: String },

    #[error("porta inválida '{0}': use N, H:N ou IP:H:N")]
    MalformedPortSpec(String),

    #[error("volume inválido '{0}': use origem:destino[:ro|rw]")]
    MalformedVolumeSpec(String),

    // =========================================================================
    // Engine
    // =========================================================================
    #[error("falha de autenticação em {server}: {reason}")]
    Auth { server: String, reason: String },

    #[error("falha ao baixar a imagem '{reference}': {reason}")]
    Pull { reference: String, reason: String },

    #[error("falha ao listar containers em execução: {0}")]
    List(String),

    #[error("falha ao criar container de '{image}': {reason}")]
    Create { image: String, reason: String },

    #[error("falha ao iniciar container {id}: {reason}")]
    Start { id: String, reason: String },

    /// An engine call did not finish within the configured timeout.
    #[error("'{operation}' excedeu o tempo limite de {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    // =========================================================================
    // Reconciliation
    // =========================================================================
    /// Create and start succeeded but the running count did not go up by one.
    #[error("'{image}' não subiu: esperado {expected} em execução, encontrado {observed}")]
    SoftStartVerification {
        image: String,
        expected: usize,
        observed: usize,
    },

    #[error("falha ao enviar notificação: {0}")]
    Notify(String),
}

impl Error {
    pub fn validation(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}
