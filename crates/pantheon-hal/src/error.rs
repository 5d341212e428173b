use thiserror::Error;

pub type HalResult<T> = std::result::Result<T, HalError>;

#[derive(Error, Debug)]
pub enum HalError {
    #[error("Safety lock engaged: destructive operation was not confirmed")]
    SafetyLock,

    #[error("Device is busy (mounted or in use)")]
    DiskBusy,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix errno: {0}")]
    Nix(#[from] nix::errno::Errno),

    #[error("{0}")]
    Other(String),
}

impl HalError {
    /// Name of the external program behind a subprocess failure, if any.
    pub fn program(&self) -> Option<&str> {
        match self {
            HalError::CommandNotFound(program)
            | HalError::CommandFailed { program, .. }
            | HalError::CommandTimeout { program, .. } => Some(program),
            _ => None,
        }
    }
}
