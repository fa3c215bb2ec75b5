//! App service - implements the inbound use cases

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tenancy_common::{
    AppId, AppTypeId, EntitySetId, FullQualifiedName, OrganizationId, PermissionSet, Principal,
};

use crate::engine::InstallationEngine;
use crate::error::AppResult;
use crate::model::{App, AppConfig, AppMetadataUpdate, AppType, AppTypeMetadataUpdate, Organization};
use crate::ports::AppUseCases;
use crate::registry::AppRegistry;

/// Facade over the registry and the installation engine
pub struct AppService {
    registry: Arc<AppRegistry>,
    engine: InstallationEngine,
}

impl AppService {
    pub fn new(registry: Arc<AppRegistry>, engine: InstallationEngine) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &InstallationEngine {
        &self.engine
    }
}

#[async_trait]
impl AppUseCases for AppService {
    async fn create_app(&self, app: App) -> AppResult<AppId> {
        self.registry.create_app(app).await
    }

    async fn delete_app(&self, app_id: AppId) -> AppResult<()> {
        self.registry.delete_app(app_id).await
    }

    async fn get_app(&self, app_id: AppId) -> AppResult<Option<App>> {
        self.registry.get_app(app_id).await
    }

    async fn get_app_by_name(&self, name: &str) -> AppResult<Option<App>> {
        self.registry.get_app_by_name(name).await
    }

    async fn get_apps(&self) -> AppResult<Vec<App>> {
        self.registry.get_apps().await
    }

    async fn create_app_type(&self, app_type: AppType) -> AppResult<AppTypeId> {
        self.registry.create_app_type(app_type).await
    }

    async fn delete_app_type(&self, app_type_id: AppTypeId) -> AppResult<()> {
        self.registry.delete_app_type(app_type_id).await
    }

    async fn get_app_type(&self, app_type_id: AppTypeId) -> AppResult<Option<AppType>> {
        self.registry.get_app_type(app_type_id).await
    }

    async fn get_app_type_by_fqn(&self, fqn: &FullQualifiedName) -> AppResult<Option<AppType>> {
        self.registry.get_app_type_by_fqn(fqn).await
    }

    async fn get_app_types(&self) -> AppResult<Vec<AppType>> {
        self.registry.get_app_types().await
    }

    async fn get_app_types_by_ids(
        &self,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<BTreeMap<AppTypeId, AppType>> {
        self.registry.get_app_types_by_ids(app_type_ids).await
    }

    async fn install_app(
        &self,
        app_id: AppId,
        organization_id: OrganizationId,
        prefix: &str,
        principal: &Principal,
    ) -> AppResult<()> {
        self.engine
            .install_app(app_id, organization_id, prefix, principal)
            .await
    }

    async fn add_app_types_to_app(
        &self,
        app_id: AppId,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<()> {
        self.engine.add_app_types_to_app(app_id, app_type_ids).await
    }

    async fn remove_app_types_from_app(
        &self,
        app_id: AppId,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<()> {
        self.engine.remove_app_types_from_app(app_id, app_type_ids).await
    }

    async fn update_app_config_entity_set_id(
        &self,
        organization_id: OrganizationId,
        app_id: AppId,
        app_type_id: AppTypeId,
        entity_set_id: EntitySetId,
    ) -> AppResult<()> {
        self.engine
            .update_app_config_entity_set_id(organization_id, app_id, app_type_id, entity_set_id)
            .await
    }

    async fn update_app_config_permissions(
        &self,
        organization_id: OrganizationId,
        app_id: AppId,
        app_type_id: AppTypeId,
        permissions: PermissionSet,
    ) -> AppResult<()> {
        self.engine
            .update_app_config_permissions(organization_id, app_id, app_type_id, permissions)
            .await
    }

    async fn update_app_metadata(&self, app_id: AppId, update: AppMetadataUpdate) -> AppResult<()> {
        self.registry.update_app_metadata(app_id, &update).await?;
        Ok(())
    }

    async fn update_app_type_metadata(
        &self,
        app_type_id: AppTypeId,
        update: AppTypeMetadataUpdate,
    ) -> AppResult<()> {
        self.registry
            .update_app_type_metadata(app_type_id, &update)
            .await?;
        Ok(())
    }

    async fn get_available_configs(
        &self,
        app_id: AppId,
        principals: &BTreeSet<Principal>,
        organizations: &[Organization],
    ) -> AppResult<Vec<AppConfig>> {
        self.engine
            .get_available_configs(app_id, principals, organizations)
            .await
    }
}
