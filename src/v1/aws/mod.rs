pub mod servicecatalog;

use std::{fmt, marker::PhantomData, sync::Arc};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use self::servicecatalog::{
    account::AccountVendingManager,
    api::{CatalogApi, ServiceCatalogApi},
};
use super::config::Settings;

/// Shared plumbing for a manager: the client it talks to, the runtime that drives
/// its async calls, and the token that cancels long waits.
pub struct AwsManager<Input, Output, Client> {
    pub(crate) client: Client,
    pub(crate) handle: Handle,
    pub(crate) settings: Settings,
    pub(crate) cancel: CancellationToken,
    _phantom: PhantomData<(Input, Output)>,
}

impl<Input, Output, Client> AwsManager<Input, Output, Client> {
    pub fn new(
        handle: &Handle,
        client: Client,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            client,
            handle: handle.clone(),
            settings: settings.clone(),
            cancel: cancel.clone(),
            _phantom: PhantomData,
        }
    }
    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<Input, Output, Client> fmt::Debug for AwsManager<Input, Output, Client> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsManager")
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

pub struct AwsProvider {
    handle: Handle,
    config: SdkConfig,
    settings: Settings,
}

impl AwsProvider {
    pub fn new(handle: &Handle, settings: &Settings) -> Self {
        handle.clone().block_on(async move {
            let region = Region::new(settings.region.clone());
            Self {
                handle: handle.clone(),
                config: aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await,
                settings: settings.clone(),
            }
        })
    }

    pub fn catalog_api(&self) -> Arc<dyn CatalogApi> {
        Arc::new(ServiceCatalogApi::new(
            aws_sdk_servicecatalog::Client::new(&self.config),
        ))
    }

    pub fn account_vending(&self, cancel: &CancellationToken) -> Arc<AccountVendingManager> {
        AccountVendingManager::new(&self.handle, self.catalog_api(), &self.settings, cancel).arc()
    }
}
