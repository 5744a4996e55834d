/// Conditions that leave a sandbox unusable. These abort the whole run, not
/// just the current test.
#[derive(thiserror::Error, Debug)]
pub enum ProvisioningFailure {
    #[error("[PH101] 'python' in the sandbox runs {found} rather than expected {expected}")]
    InterpreterEscaped { found: String, expected: String },
    #[error("[PH102] sandbox path {path} is not inside the sandbox root {root}")]
    PathOutsideRoot { path: String, root: String },
    #[error("[PH103] provisioning step '{step}' failed: {message}")]
    Step {
        step: &'static str,
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("[PH104] backup for variant '{variant}' could not be {action}: {message}")]
    Backup {
        variant: String,
        action: &'static str,
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ProvisioningFailure {
    pub(crate) fn step(step: &'static str, source: anyhow::Error) -> Self {
        Self::Step {
            step,
            message: format!("{source:#}"),
            source,
        }
    }

    pub(crate) fn backup(variant: &str, action: &'static str, source: anyhow::Error) -> Self {
        Self::Backup {
            variant: variant.to_string(),
            action,
            message: format!("{source:#}"),
            source,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InterpreterEscaped { .. } => "PH101",
            Self::PathOutsideRoot { .. } => "PH102",
            Self::Step { .. } => "PH103",
            Self::Backup { .. } => "PH104",
        }
    }
}
