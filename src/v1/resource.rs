use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::manager::{ManagerError, ResourceManager, ResourceOutput};

/// A named resource: what was declared, what was last observed, and what should be.
#[derive(Clone, Serialize, Deserialize)]
pub struct Resource<Input, Output> {
    pub name: String,
    pub input: Input,
    pub output: Output,
    #[serde(default)]
    pub state: ResourceState,
    #[serde(skip, default = "default_manager")]
    pub manager: Option<Arc<dyn ResourceManager<Input, Output>>>,
}

impl<Input: fmt::Debug, Output: fmt::Debug> fmt::Debug for Resource<Input, Output> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("state", &self.state)
            .finish()
    }
}

impl<Input, Output> Resource<Input, Output>
where
    Output: ResourceOutput + Default,
{
    pub fn new(
        manager: Arc<dyn ResourceManager<Input, Output>>,
        name: impl ToString,
        input: Input,
        state: ResourceState,
    ) -> Self {
        Self {
            name: name.to_string(),
            input,
            output: Output::default(),
            state,
            manager: Some(manager),
        }
    }

    pub fn with_manager(mut self, manager: Arc<dyn ResourceManager<Input, Output>>) -> Self {
        self.manager = Some(manager);
        self
    }

    fn manager(&self) -> Result<Arc<dyn ResourceManager<Input, Output>>, ResourceError> {
        self.manager.clone().ok_or(ResourceError::ManagerNotSet)
    }

    pub fn is_present(&self) -> bool {
        self.output.is_present()
    }

    /// Drives the resource towards its desired [`ResourceState`].
    pub fn converge(&mut self) -> Result<(), ResourceError> {
        match self.state {
            ResourceState::Present => self.ensure_present(),
            ResourceState::Absent => self.ensure_absent().map(|_| ()),
        }
    }

    pub fn ensure_present(&mut self) -> Result<(), ResourceError> {
        info!(resource = %self.name, "ensuring resource is present");
        self.manager()?
            .ensure_present(&self.input, &mut self.output)
            .map_err(|err| ResourceError::ManagerError(self.name.clone(), err))
    }

    pub fn ensure_absent(&mut self) -> Result<bool, ResourceError> {
        if !self.output.is_present() {
            return Ok(false);
        }
        info!(resource = %self.name, "ensuring resource is absent");
        self.manager()?
            .ensure_absent(&mut self.output)
            .map_err(|err| ResourceError::ManagerError(self.name.clone(), err))
    }

    pub fn refresh(&mut self) -> Result<(), ResourceError> {
        self.manager()?
            .read(&mut self.output)
            .map_err(|err| ResourceError::ManagerError(self.name.clone(), err))
    }

    pub fn import(&mut self, id: &str) -> Result<(), ResourceError> {
        self.output = self
            .manager()?
            .import(id)
            .map_err(|err| ResourceError::ManagerError(self.name.clone(), err))?;
        Ok(())
    }
}

pub fn default_manager<Input, Output>() -> Option<Arc<dyn ResourceManager<Input, Output>>> {
    None
}

/// Desired state of a declared resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum ResourceState {
    Absent,
    #[default]
    Present,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("ManagerNotSet")]
    ManagerNotSet,
    #[error("Resource[{0}]: {1}")]
    ManagerError(String, #[source] ManagerError),
}

impl ResourceError {
    pub fn manager_error(&self) -> Option<&ManagerError> {
        match self {
            ResourceError::ManagerError(_, err) => Some(err),
            ResourceError::ManagerNotSet => None,
        }
    }
}
