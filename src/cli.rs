pub mod supervisor;

use crate::infra::config::{CONFIG_TEMPLATE, DEFAULT_CONFIG_PATH, DEFAULT_SPEC_DIR, SPEC_TEMPLATE};

pub use supervisor::Supervisor;

/// Annotated templates for the global config and a spec file.
pub fn templates() -> String {
    format!(
        "# {DEFAULT_CONFIG_PATH}\n{CONFIG_TEMPLATE}\n\n# {DEFAULT_SPEC_DIR}/<grupo>.json\n{SPEC_TEMPLATE}\n"
    )
}
