pub mod v1;

pub mod prelude {
    pub use crate::v1::aws::{
        servicecatalog::{account::*, api::*},
        AwsManager, AwsProvider,
    };
    pub use crate::v1::cloud::*;
    pub use crate::v1::config::*;
    pub use crate::v1::datastore::{Datastore, DatastoreError, Storage};
    pub use crate::v1::manager::*;
    pub use crate::v1::resource::{ResourceState::*, *};
    pub use crate::v1::storage::file::*;
    pub use crate::v1::tracker::*;
    pub use crate::v1::waiter::*;
}
