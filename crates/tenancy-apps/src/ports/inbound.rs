//! Inbound ports (use case traits)
//!
//! Hexagonal architecture: the operations a transport layer drives.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tenancy_common::{
    AppId, AppTypeId, EntitySetId, FullQualifiedName, OrganizationId, PermissionSet, Principal,
};

use crate::error::AppResult;
use crate::model::{
    App, AppConfig, AppMetadataUpdate, AppType, AppTypeMetadataUpdate, Organization,
};

/// App management and installation use cases
#[async_trait]
pub trait AppUseCases: Send + Sync {
    /// Register an app template
    async fn create_app(&self, app: App) -> AppResult<AppId>;

    async fn delete_app(&self, app_id: AppId) -> AppResult<()>;

    async fn get_app(&self, app_id: AppId) -> AppResult<Option<App>>;

    async fn get_app_by_name(&self, name: &str) -> AppResult<Option<App>>;

    async fn get_apps(&self) -> AppResult<Vec<App>>;

    /// Register an app type
    async fn create_app_type(&self, app_type: AppType) -> AppResult<AppTypeId>;

    async fn delete_app_type(&self, app_type_id: AppTypeId) -> AppResult<()>;

    async fn get_app_type(&self, app_type_id: AppTypeId) -> AppResult<Option<AppType>>;

    async fn get_app_type_by_fqn(&self, fqn: &FullQualifiedName) -> AppResult<Option<AppType>>;

    async fn get_app_types(&self) -> AppResult<Vec<AppType>>;

    async fn get_app_types_by_ids(
        &self,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<BTreeMap<AppTypeId, AppType>>;

    /// Install an app into an organization
    async fn install_app(
        &self,
        app_id: AppId,
        organization_id: OrganizationId,
        prefix: &str,
        principal: &Principal,
    ) -> AppResult<()>;

    /// Declare more types on an app and provision them where it is installed
    async fn add_app_types_to_app(
        &self,
        app_id: AppId,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<()>;

    async fn remove_app_types_from_app(
        &self,
        app_id: AppId,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<()>;

    async fn update_app_config_entity_set_id(
        &self,
        organization_id: OrganizationId,
        app_id: AppId,
        app_type_id: AppTypeId,
        entity_set_id: EntitySetId,
    ) -> AppResult<()>;

    async fn update_app_config_permissions(
        &self,
        organization_id: OrganizationId,
        app_id: AppId,
        app_type_id: AppTypeId,
        permissions: PermissionSet,
    ) -> AppResult<()>;

    async fn update_app_metadata(&self, app_id: AppId, update: AppMetadataUpdate) -> AppResult<()>;

    async fn update_app_type_metadata(
        &self,
        app_type_id: AppTypeId,
        update: AppTypeMetadataUpdate,
    ) -> AppResult<()>;

    /// Installed configs usable by `principals` in the given organizations
    async fn get_available_configs(
        &self,
        app_id: AppId,
        principals: &BTreeSet<Principal>,
        organizations: &[Organization],
    ) -> AppResult<Vec<AppConfig>>;
}
