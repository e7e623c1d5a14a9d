use thiserror::Error;

/// Lifecycle calls for one resource class.
///
/// The instance state is owned by the caller and handed in by `&mut`: calls record what
/// they learn as they go, so identifiers captured before a failure survive it.
pub trait ResourceManager<Input, Output>: Send + Sync {
    fn create(&self, input: &Input, state: &mut Output) -> Result<(), ManagerError>;
    fn read(&self, state: &mut Output) -> Result<(), ManagerError>;
    fn update(&self, input: &Input, state: &mut Output) -> Result<(), ManagerError>;
    fn delete(&self, state: &mut Output) -> Result<(), ManagerError>;
    /// Builds state for an object created outside this tool.
    fn import(&self, id: &str) -> Result<Output, ManagerError>;
    fn ensure_absent(&self, state: &mut Output) -> Result<bool, ManagerError>
    where
        Output: ResourceOutput,
    {
        self.read(state)?;
        if !state.is_present() {
            return Ok(false);
        }
        self.delete(state)?;
        Ok(true)
    }
    fn ensure_present(&self, input: &Input, state: &mut Output) -> Result<(), ManagerError>
    where
        Output: ResourceOutput,
    {
        if state.is_present() {
            self.read(state)?;
        }
        if state.is_present() {
            self.update(input, state)
        } else {
            self.create(input, state)
        }
    }
}

pub trait ResourceOutput {
    fn is_present(&self) -> bool;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("ValidationError: {0}")]
    Validation(String),
    #[error("RemoteError: {0}")]
    Remote(String),
    #[error("NotFound: {0}")]
    NotFound(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("OperationFailed: status {status}: {diagnostics}")]
    OperationFailed { status: String, diagnostics: String },
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("CannotSyncWithoutRecreate: {0}")]
    CannotSyncWithoutRecreate(String),
}
