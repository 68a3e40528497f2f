use dnup_backend::{ComponentSpecError, InstallError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("Invalid install spec: {0}")]
    Spec(#[from] ComponentSpecError),
}
