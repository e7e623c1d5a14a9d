use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{
    aws::servicecatalog::account::{AccountVendingInput, AccountVendingOutput},
    datastore::{Datastore, DatastoreError},
    manager::ResourceManager,
    resource::{Resource, ResourceError, ResourceState},
};

pub type AccountResource = Resource<AccountVendingInput, AccountVendingOutput>;
pub type AccountManager = Arc<dyn ResourceManager<AccountVendingInput, AccountVendingOutput>>;

/// The accounts a user wants, keyed by a local name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub accounts: BTreeMap<String, DeclaredAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredAccount {
    #[serde(default)]
    pub state: ResourceState,
    #[serde(flatten)]
    pub input: AccountVendingInput,
}

impl Declaration {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CloudError> {
        let path = path.as_ref();
        let raw = fs::read(path)
            .map_err(|e| CloudError::Declaration(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| CloudError::Declaration(format!("{}: {}", path.display(), e)))
    }
}

/// Reconciles declared accounts against what the datastore says exists.
///
/// Resources are handled one at a time, so each instance has at most one
/// lifecycle call (and one poll loop) in flight.
pub struct VendCloud {
    declaration: Declaration,
    datastore: Datastore,
    manager: AccountManager,
}

impl VendCloud {
    pub fn new(declaration: Declaration, datastore: Datastore, manager: AccountManager) -> Self {
        Self {
            declaration,
            datastore,
            manager,
        }
    }

    pub fn apply(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        let result = self.apply_declared().and_then(|_| self.remove_undeclared());
        self.datastore.save()?;
        result
    }

    pub fn refresh(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        let result = self.datastore.keys().into_iter().try_for_each(|name| {
            let mut resource = match self.stored(&name)? {
                Some(resource) => resource,
                None => return Ok(()),
            };
            let result = resource.refresh();
            self.persist(&resource)?;
            result.map_err(CloudError::from)
        });
        self.datastore.save()?;
        result
    }

    pub fn destroy(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        let result = self
            .datastore
            .keys()
            .into_iter()
            .try_for_each(|name| self.remove(&name));
        self.datastore.save()?;
        result
    }

    /// Records an existing provisioned product under a declared name.
    pub fn import(&mut self, name: &str, external_id: &str) -> Result<(), CloudError> {
        self.datastore.reload()?;
        if self.datastore.contains(name) {
            return Err(CloudError::AlreadyManaged(name.to_string()));
        }
        let declared = self
            .declaration
            .accounts
            .get(name)
            .ok_or(CloudError::NotDeclared(name.to_string()))?;
        let mut resource = Resource::new(
            self.manager.clone(),
            name,
            declared.input.clone(),
            declared.state.clone(),
        );
        resource.import(external_id)?;
        info!(resource = %name, %external_id, "imported provisioned product");
        self.persist(&resource)?;
        self.datastore.save()?;
        Ok(())
    }

    /// Stored resources, for display.
    pub fn show(&mut self) -> Result<Vec<AccountResource>, CloudError> {
        self.datastore.reload()?;
        self.datastore
            .keys()
            .into_iter()
            .filter_map(|name| self.stored(&name).transpose())
            .collect()
    }

    fn apply_declared(&mut self) -> Result<(), CloudError> {
        let declared: Vec<(String, DeclaredAccount)> = self
            .declaration
            .accounts
            .iter()
            .map(|(name, account)| (name.clone(), account.clone()))
            .collect();
        for (name, account) in declared {
            let mut resource = Resource::new(
                self.manager.clone(),
                &name,
                account.input,
                account.state,
            );
            if let Some(stored) = self.stored(&name)? {
                resource.output = stored.output;
            }
            let result = resource.converge();
            // Identifiers captured before a failure are kept for the next run.
            self.persist(&resource)?;
            result?;
        }
        Ok(())
    }

    fn remove_undeclared(&mut self) -> Result<(), CloudError> {
        for name in self.datastore.keys() {
            if !self.declaration.accounts.contains_key(&name) {
                warn!(resource = %name, "no longer declared, removing");
                self.remove(&name)?;
            }
        }
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), CloudError> {
        let mut resource = match self.stored(name)? {
            Some(resource) => resource,
            None => return Ok(()),
        };
        resource.state = ResourceState::Absent;
        let result = resource.converge();
        self.persist(&resource)?;
        result.map_err(CloudError::from)
    }

    fn stored(&self, name: &str) -> Result<Option<AccountResource>, CloudError> {
        Ok(self
            .datastore
            .get::<AccountResource>(name)?
            .map(|resource| resource.with_manager(self.manager.clone())))
    }

    fn persist(&mut self, resource: &AccountResource) -> Result<(), CloudError> {
        if resource.is_present() {
            self.datastore.insert(resource.name.clone(), resource)?;
        } else {
            self.datastore.remove(&resource.name);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("ResourceError: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("DatastoreError: {0}")]
    DatastoreError(#[from] DatastoreError),
    #[error("Invalid declaration: {0}")]
    Declaration(String),
    #[error("Account {0} is not declared")]
    NotDeclared(String),
    #[error("Account {0} is already managed")]
    AlreadyManaged(String),
}
