//! Installation Engine
//!
//! Installs apps into organizations, fans ACL grants out over collections and
//! their properties, and reconciles installed organizations when an app
//! declares new types.
//!
//! End state after provisioning one (app, organization, app type):
//! - the app principal and every organization owner hold the full permission
//!   set on the collection and on each of its properties
//! - each app role holds exactly its designated permission at the same scopes
//!
//! Installs are best-effort. A failure part way leaves earlier collections in
//! place; re-running skips every triple that already has a config entry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tenancy_common::{
    AclKey, AppId, AppPrincipalKey, AppTypeId, EntitySetId, OrganizationId, Permission,
    PermissionSet, Principal,
};
use tracing::{debug, info, warn};

use crate::config::ProvisioningConfig;
use crate::config_store::ConfigStore;
use crate::entity_sets::EntitySetProvisioner;
use crate::error::{AppError, AppResult};
use crate::events::AppEvent;
use crate::model::{
    AccessCheck, App, AppConfig, AppConfigKey, AppTypeSetting, Authorization, Organization,
};
use crate::ports::{AuthorizationService, EntityDataModel, OrganizationService};
use crate::registry::AppRegistry;
use crate::roles::RoleProvisioner;

/// Provisioning engine
pub struct InstallationEngine {
    registry: Arc<AppRegistry>,
    configs: ConfigStore,
    roles: RoleProvisioner,
    entity_sets: EntitySetProvisioner,
    authorizations: Arc<dyn AuthorizationService>,
    catalog: Arc<dyn EntityDataModel>,
    organizations: Arc<dyn OrganizationService>,
    config: ProvisioningConfig,
}

impl InstallationEngine {
    #[allow(clippy::too_many_arguments)]
    /// Engine over its collaborators; `config` fixes the role, baseline and
    /// availability permission sets
    pub fn new(
        registry: Arc<AppRegistry>,
        configs: ConfigStore,
        roles: RoleProvisioner,
        entity_sets: EntitySetProvisioner,
        authorizations: Arc<dyn AuthorizationService>,
        catalog: Arc<dyn EntityDataModel>,
        organizations: Arc<dyn OrganizationService>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            registry,
            configs,
            roles,
            entity_sets,
            authorizations,
            catalog,
            organizations,
            config,
        }
    }

    /// Installed (app, organization, type) settings
    pub fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    /// Collection provisioner used for every new triple
    pub fn entity_sets(&self) -> &EntitySetProvisioner {
        &self.entity_sets
    }

    /// Permission sets in effect
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    async fn grant(&self, acl_key: &AclKey, principal: &Principal, permissions: &PermissionSet) -> AppResult<()> {
        self.authorizations
            .add_permission(acl_key, principal, permissions)
            .await?;
        Ok(())
    }

    /// Provision the collection for one triple and grant access on it.
    ///
    /// If another installer stored a setting for `key` first, that setting
    /// wins and its collection id is returned without further grants.
    pub async fn create_entity_set_for_app(
        &self,
        key: AppConfigKey,
        prefix: &str,
        user_principal: &Principal,
        app_principal: &Principal,
        app_roles: &BTreeMap<Permission, Principal>,
        owners: &BTreeSet<Principal>,
    ) -> AppResult<EntitySetId> {
        let entity_set_id = self
            .entity_sets
            .generate_entity_set(key.organization_id, key.app_type_id, prefix, user_principal)
            .await?;

        let setting = AppTypeSetting::new(entity_set_id, self.config.app_baseline_permissions.clone());
        if !self.configs.put_if_absent(key, setting).await? {
            let existing = self
                .configs
                .get(&key)
                .await?
                .ok_or(AppError::AppConfigNotFound(key))?;
            warn!(
                app_id = %key.app_id,
                organization_id = %key.organization_id,
                app_type_id = %key.app_type_id,
                orphaned = %entity_set_id,
                kept = %existing.entity_set_id,
                "app type configured concurrently, keeping existing entity set"
            );
            return Ok(existing.entity_set_id);
        }

        let full = Permission::all();
        let collection = AclKey::collection(entity_set_id);
        self.grant(&collection, app_principal, &full).await?;
        for owner in owners {
            self.grant(&collection, owner, &full).await?;
        }

        let app_type = self.registry.require_app_type(key.app_type_id).await?;
        let properties = self
            .catalog
            .get_entity_type_properties(app_type.entity_type_id)
            .await?;
        for property_id in &properties {
            let acl_key = AclKey::property(entity_set_id, *property_id);
            self.grant(&acl_key, app_principal, &full).await?;
            for owner in owners {
                self.grant(&acl_key, owner, &full).await?;
            }
            for (permission, role) in app_roles {
                self.grant(&acl_key, role, &BTreeSet::from([*permission])).await?;
            }
        }

        for (permission, role) in app_roles {
            self.grant(&collection, role, &BTreeSet::from([*permission])).await?;
        }

        debug!(
            app_id = %key.app_id,
            organization_id = %key.organization_id,
            app_type_id = %key.app_type_id,
            %entity_set_id,
            properties = properties.len(),
            "app type provisioned"
        );
        Ok(entity_set_id)
    }

    /// Install an app into an organization
    pub async fn install_app(
        &self,
        app_id: AppId,
        organization_id: OrganizationId,
        prefix: &str,
        principal: &Principal,
    ) -> AppResult<()> {
        let app = self.registry.require_app(app_id).await?;
        let organization = self
            .organizations
            .get_organization(organization_id)
            .await?
            .ok_or(AppError::OrganizationNotFound(organization_id))?;
        info!(%app_id, %organization_id, organization = %organization.title, prefix, "installing app");

        let app_roles = self
            .roles
            .get_or_create_roles_for_app_permission(&app, organization_id, &self.config.role_permissions, principal)
            .await?;
        let app_principal = AppPrincipalKey::new(app_id, organization_id).principal();
        let owners = self.organizations.get_owners(organization_id).await?;

        let mut provisioned = 0;
        for app_type_id in &app.app_type_ids {
            let key = AppConfigKey::new(app_id, organization_id, *app_type_id);
            if self.configs.contains(&key).await? {
                debug!(%app_id, %organization_id, %app_type_id, "app type already configured, skipping");
                continue;
            }
            self.create_entity_set_for_app(key, prefix, principal, &app_principal, &app_roles, &owners)
                .await?;
            provisioned += 1;
        }

        self.organizations.add_app_to_org(organization_id, app_id).await?;
        info!(%app_id, %organization_id, provisioned, "app installed");
        Ok(())
    }

    /// Provision newly declared types in every organization that already
    /// has the app installed
    pub async fn update_app_configs_for_new_app_type(
        &self,
        app_id: AppId,
        new_app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<()> {
        let app = self.registry.require_app(app_id).await?;
        let organization_ids: BTreeSet<OrganizationId> = self
            .configs
            .keys_for_app(app_id)
            .await?
            .into_iter()
            .map(|key| key.organization_id)
            .collect();

        for organization_id in organization_ids {
            let mut pending = Vec::new();
            for app_type_id in new_app_type_ids {
                let key = AppConfigKey::new(app_id, organization_id, *app_type_id);
                if !self.configs.contains(&key).await? {
                    pending.push(key);
                }
            }
            if pending.is_empty() {
                debug!(%app_id, %organization_id, "organization already has every type configured");
                continue;
            }

            let owners = self.organizations.get_owners(organization_id).await?;
            let prefix = self
                .organizations
                .get_organization(organization_id)
                .await?
                .ok_or(AppError::OrganizationNotFound(organization_id))?
                .title;
            let user = owners
                .iter()
                .find(|owner| owner.is_user())
                .cloned()
                .ok_or(AppError::NoUserOwner(organization_id))?;

            let app_roles = self
                .roles
                .get_or_create_roles_for_app_permission(&app, organization_id, &self.config.role_permissions, &user)
                .await?;
            let app_principal = AppPrincipalKey::new(app_id, organization_id).principal();

            for key in &pending {
                self.create_entity_set_for_app(*key, &prefix, &user, &app_principal, &app_roles, &owners)
                    .await?;
            }
            info!(%app_id, %organization_id, provisioned = pending.len(), "organization reconciled");
        }
        Ok(())
    }

    pub async fn add_app_types_to_app(&self, app_id: AppId, app_type_ids: &BTreeSet<AppTypeId>) -> AppResult<()> {
        let app = self.registry.add_app_types(app_id, app_type_ids).await?;
        self.update_app_configs_for_new_app_type(app_id, app_type_ids).await?;
        self.registry.post(AppEvent::AppUpdated(app));
        Ok(())
    }

    /// Drops the types from the app; granted access stays in place
    pub async fn remove_app_types_from_app(&self, app_id: AppId, app_type_ids: &BTreeSet<AppTypeId>) -> AppResult<()> {
        let app = self.registry.remove_app_types(app_id, app_type_ids).await?;
        self.registry.post(AppEvent::AppUpdated(app));
        Ok(())
    }

    pub async fn update_app_config_entity_set_id(
        &self,
        organization_id: OrganizationId,
        app_id: AppId,
        app_type_id: AppTypeId,
        entity_set_id: EntitySetId,
    ) -> AppResult<()> {
        let key = AppConfigKey::new(app_id, organization_id, app_type_id);
        let setting = self.configs.update_entity_set_id(&key, entity_set_id).await?;
        self.grant_setting(&key, &setting).await
    }

    pub async fn update_app_config_permissions(
        &self,
        organization_id: OrganizationId,
        app_id: AppId,
        app_type_id: AppTypeId,
        permissions: PermissionSet,
    ) -> AppResult<()> {
        let key = AppConfigKey::new(app_id, organization_id, app_type_id);
        let setting = self.configs.update_permissions(&key, permissions).await?;
        self.grant_setting(&key, &setting).await
    }

    async fn grant_setting(&self, key: &AppConfigKey, setting: &AppTypeSetting) -> AppResult<()> {
        let app_principal = AppPrincipalKey::new(key.app_id, key.organization_id).principal();
        self.grant(&AclKey::collection(setting.entity_set_id), &app_principal, &setting.permissions)
            .await
    }

    /// Configs of `app_id` that both the callers and the app itself can use.
    ///
    /// Fails closed: a missing authorization record counts as denied.
    pub async fn get_available_configs(
        &self,
        app_id: AppId,
        principals: &BTreeSet<Principal>,
        organizations: &[Organization],
    ) -> AppResult<Vec<AppConfig>> {
        let app = self.registry.require_app(app_id).await?;
        let mut available = Vec::new();

        for organization in organizations {
            let installed = self.organizations.get_organization_apps(organization.id).await?;
            if !installed.contains(&app_id) {
                continue;
            }

            if let Some(config) = self.available_config(&app, organization, principals).await? {
                available.push(config);
            }
        }
        Ok(available)
    }

    async fn available_config(
        &self,
        app: &App,
        organization: &Organization,
        principals: &BTreeSet<Principal>,
    ) -> AppResult<Option<AppConfig>> {
        let keys: Vec<AppConfigKey> = app
            .app_type_ids
            .iter()
            .map(|app_type_id| AppConfigKey::new(app.id, organization.id, *app_type_id))
            .collect();
        let settings = self.configs.get_all(&keys).await?;

        let checks: Vec<AccessCheck> = settings
            .values()
            .map(|setting| AccessCheck {
                acl_key: AclKey::collection(setting.entity_set_id),
                permissions: self.config.availability_permissions.clone(),
            })
            .collect();

        if !self.all_authorized(&checks, principals).await? {
            debug!(app_id = %app.id, organization_id = %organization.id, "caller not authorized for app config");
            return Ok(None);
        }

        let app_principal = AppPrincipalKey::new(app.id, organization.id).principal();
        if !self.all_authorized(&checks, &BTreeSet::from([app_principal.clone()])).await? {
            debug!(app_id = %app.id, organization_id = %organization.id, "app not authorized for its own config");
            return Ok(None);
        }

        let mut config = BTreeMap::new();
        for (key, setting) in settings {
            let type_name = match self.registry.get_app_type(key.app_type_id).await? {
                Some(app_type) => app_type.type_fqn.to_string(),
                None => {
                    warn!(app_type_id = %key.app_type_id, "config references unknown app type");
                    key.app_type_id.to_string()
                }
            };
            config.insert(type_name, setting);
        }

        Ok(Some(AppConfig {
            principal: app_principal,
            app_id: app.id,
            title: app.title.clone(),
            description: app.description.clone(),
            organization: organization.clone(),
            config,
        }))
    }

    async fn all_authorized(&self, checks: &[AccessCheck], principals: &BTreeSet<Principal>) -> AppResult<bool> {
        let results: BTreeMap<AclKey, Authorization> = self
            .authorizations
            .access_checks_for_principals(checks, principals)
            .await?
            .into_iter()
            .map(|authorization| (authorization.acl_key.clone(), authorization))
            .collect();

        for check in checks {
            let Some(authorization) = results.get(&check.acl_key) else {
                warn!(acl_key = %check.acl_key, "no authorization record returned, treating as denied");
                return Ok(false);
            };
            if !authorization.grants_all(&check.permissions) {
                debug!(acl_key = %check.acl_key, "requested permissions not all granted");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryPlatform;
    use crate::model::AppType;
    use crate::ports::{AppUseCases, ServiceError, ServiceResult};
    use crate::service::AppService;
    use async_trait::async_trait;
    use tenancy_common::{
        EntityTypeId, EventDispatcher, FullQualifiedName, PropertyTypeId, RecordingObserver,
        RolePrincipalKey,
    };
    use tokio_test::assert_ok;

    struct Fixture {
        platform: InMemoryPlatform,
        service: AppService,
        dispatcher: EventDispatcher<AppEvent>,
        app: App,
        t1: AppType,
        t1_properties: Vec<PropertyTypeId>,
        org: Organization,
        owner: Principal,
    }

    async fn register_type(platform: &InMemoryPlatform, service: &AppService, name: &str) -> (AppType, Vec<PropertyTypeId>) {
        let entity_type_id = EntityTypeId::new_v4();
        let properties = vec![PropertyTypeId::new_v4(), PropertyTypeId::new_v4()];
        platform.catalog.register_entity_type(entity_type_id, properties.clone());

        let app_type = AppType::new(FullQualifiedName::new("app", name), entity_type_id, name, "");
        service.create_app_type(app_type.clone()).await.unwrap();
        (app_type, properties)
    }

    async fn fixture() -> Fixture {
        let platform = InMemoryPlatform::default();
        let (service, dispatcher) = platform.build_service();

        let (t1, t1_properties) = register_type(&platform, &service, "person").await;
        let app = App::new("survey", "A Title", "Surveys", [t1.id]);
        service.create_app(app.clone()).await.unwrap();

        let org = Organization {
            id: OrganizationId::new_v4(),
            title: "Acme".into(),
        };
        let owner = Principal::user("u1");
        platform
            .organizations
            .add_organization(org.clone(), [owner.clone()], vec![1, 2]);

        Fixture {
            platform,
            service,
            dispatcher,
            app,
            t1,
            t1_properties,
            org,
            owner,
        }
    }

    async fn install(fx: &Fixture) {
        fx.service
            .install_app(fx.app.id, fx.org.id, &fx.org.title, &fx.owner)
            .await
            .unwrap();
    }

    async fn setting(fx: &Fixture, app_type_id: AppTypeId) -> Option<AppTypeSetting> {
        fx.service
            .engine()
            .configs()
            .get(&AppConfigKey::new(fx.app.id, fx.org.id, app_type_id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_install_provisions_config_roles_and_grants() {
        let fx = fixture().await;
        install(&fx).await;

        let setting = setting(&fx, fx.t1.id).await.unwrap();
        assert_eq!(
            setting.permissions,
            [Permission::Read, Permission::Write].into_iter().collect::<PermissionSet>()
        );
        assert_eq!(fx.service.engine().configs().keys_for_app(fx.app.id).await.unwrap().len(), 1);

        let es = setting.entity_set_id;
        let app_principal = AppPrincipalKey::new(fx.app.id, fx.org.id).principal();
        assert_eq!(fx.platform.collection_permissions(es, &app_principal), Permission::all());
        assert_eq!(fx.platform.collection_permissions(es, &fx.owner), Permission::all());

        for permission in [Permission::Read, Permission::Write, Permission::Owner] {
            let role = RolePrincipalKey::new(fx.org.id, "A Title", permission).principal();
            assert_eq!(role.id, format!("{}|A Title - {}", fx.org.id, permission));
            assert!(fx.platform.principals.role(&role).is_some());
            assert_eq!(fx.platform.collection_permissions(es, &role), BTreeSet::from([permission]));
            for property in &fx.t1_properties {
                assert_eq!(
                    fx.platform
                        .authorizations
                        .permissions_for(&AclKey::property(es, *property), &role),
                    BTreeSet::from([permission])
                );
            }
        }

        let installed = fx.platform.organizations.get_organization_apps(fx.org.id).await.unwrap();
        assert!(installed.contains(&fx.app.id));
    }

    #[tokio::test]
    async fn test_full_set_at_every_property_scope() {
        let fx = fixture().await;
        install(&fx).await;

        let es = setting(&fx, fx.t1.id).await.unwrap().entity_set_id;
        let app_principal = AppPrincipalKey::new(fx.app.id, fx.org.id).principal();
        for principal in [&app_principal, &fx.owner] {
            for permission in Permission::all() {
                assert!(fx.platform.holds_everywhere(es, &fx.t1_properties, principal, permission));
            }
        }
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let fx = fixture().await;
        install(&fx).await;
        let first = setting(&fx, fx.t1.id).await;

        install(&fx).await;

        assert_eq!(setting(&fx, fx.t1.id).await, first);
        assert_eq!(fx.platform.catalog.entity_set_count(), 1);
        assert_eq!(fx.platform.principals.role_count(), 3);
    }

    #[tokio::test]
    async fn test_install_unknown_app() {
        let fx = fixture().await;
        let err = fx
            .service
            .install_app(AppId::new_v4(), fx.org.id, "Acme", &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AppNotFound(_)));
    }

    #[tokio::test]
    async fn test_install_unknown_org_provisions_nothing() {
        let fx = fixture().await;
        let ghost = OrganizationId::new_v4();

        let err = fx
            .service
            .install_app(fx.app.id, ghost, "ghost", &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OrganizationNotFound(id) if id == ghost));
        assert_eq!(fx.platform.catalog.entity_set_count(), 0);
        assert_eq!(fx.platform.principals.role_count(), 0);
        assert!(fx.service.engine().configs().keys_for_app(fx.app.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_stops_at_failing_type_and_resumes() {
        let fx = fixture().await;
        let (mut first, _) = register_type(&fx.platform, &fx.service, "household").await;
        fx.service.delete_app_type(first.id).await.unwrap();
        first.id = AppTypeId::from(uuid::Uuid::from_u128(1));
        fx.service.create_app_type(first.clone()).await.unwrap();

        let unregistered = EntityTypeId::new_v4();
        let mut second = AppType::new(FullQualifiedName::new("app", "member"), unregistered, "member", "");
        second.id = AppTypeId::from(uuid::Uuid::from_u128(2));
        fx.service.create_app_type(second.clone()).await.unwrap();

        let app = App::new("census", "Census", "", [first.id, second.id]);
        fx.service.create_app(app.clone()).await.unwrap();

        let err = fx
            .service
            .install_app(app.id, fx.org.id, &fx.org.title, &fx.owner)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Service(ServiceError::Rejected { .. })));

        let configs = fx.service.engine().configs();
        let first_key = AppConfigKey::new(app.id, fx.org.id, first.id);
        let first_setting = configs.get(&first_key).await.unwrap().unwrap();
        assert!(!configs.contains(&AppConfigKey::new(app.id, fx.org.id, second.id)).await.unwrap());
        assert_eq!(fx.platform.catalog.entity_set_count(), 1);
        let installed = fx.platform.organizations.get_organization_apps(fx.org.id).await.unwrap();
        assert!(!installed.contains(&app.id));

        fx.platform.catalog.register_entity_type(unregistered, vec![PropertyTypeId::new_v4()]);
        assert_ok!(
            fx.service
                .install_app(app.id, fx.org.id, &fx.org.title, &fx.owner)
                .await
        );

        assert_eq!(configs.get(&first_key).await.unwrap(), Some(first_setting));
        assert!(configs.contains(&AppConfigKey::new(app.id, fx.org.id, second.id)).await.unwrap());
        assert_eq!(fx.platform.catalog.entity_set_count(), 2);
        let installed = fx.platform.organizations.get_organization_apps(fx.org.id).await.unwrap();
        assert!(installed.contains(&app.id));
    }

    #[tokio::test]
    async fn test_concurrent_setting_wins_over_new_entity_set() {
        let fx = fixture().await;
        install(&fx).await;
        let key = AppConfigKey::new(fx.app.id, fx.org.id, fx.t1.id);
        let before = setting(&fx, fx.t1.id).await.unwrap();

        let engine = fx.service.engine();
        let owners = BTreeSet::from([fx.owner.clone()]);
        let app_principal = AppPrincipalKey::new(fx.app.id, fx.org.id).principal();
        let roles = engine
            .roles
            .get_or_create_roles_for_app_permission(&fx.app, fx.org.id, &engine.config.role_permissions, &fx.owner)
            .await
            .unwrap();

        let entity_set_id = engine
            .create_entity_set_for_app(key, &fx.org.title, &fx.owner, &app_principal, &roles, &owners)
            .await
            .unwrap();

        assert_eq!(entity_set_id, before.entity_set_id);
        assert_eq!(setting(&fx, fx.t1.id).await, Some(before));
    }

    #[tokio::test]
    async fn test_add_app_type_reconciles_installed_orgs() {
        let mut fx = fixture().await;
        let recorder = Arc::new(RecordingObserver::<AppEvent>::new());
        fx.platform.observers.register(recorder.clone());
        install(&fx).await;
        let t1_before = setting(&fx, fx.t1.id).await;

        let (t2, _) = register_type(&fx.platform, &fx.service, "visit").await;
        fx.service
            .add_app_types_to_app(fx.app.id, &BTreeSet::from([t2.id]))
            .await
            .unwrap();

        let t2_setting = setting(&fx, t2.id).await.unwrap();
        assert_eq!(setting(&fx, fx.t1.id).await, t1_before);
        assert_eq!(fx.service.engine().configs().keys_for_app(fx.app.id).await.unwrap().len(), 2);

        let stored = fx.platform.catalog.entity_set(t2_setting.entity_set_id).unwrap();
        assert_eq!(stored.descriptor.name, "acme_app_visit");
        assert_eq!(stored.owner, fx.owner);

        let app = fx.service.get_app(fx.app.id).await.unwrap().unwrap();
        assert!(app.app_type_ids.contains(&t2.id));

        fx.dispatcher.drain().await;
        assert_eq!(recorder.events().last(), Some(&AppEvent::AppUpdated(app)));
    }

    #[tokio::test]
    async fn test_reconciliation_is_idempotent() {
        let fx = fixture().await;
        install(&fx).await;
        let (t2, _) = register_type(&fx.platform, &fx.service, "visit").await;
        let new_types = BTreeSet::from([t2.id]);

        fx.service.add_app_types_to_app(fx.app.id, &new_types).await.unwrap();
        let count = fx.platform.catalog.entity_set_count();

        assert_ok!(
            fx.service
                .engine()
                .update_app_configs_for_new_app_type(fx.app.id, &new_types)
                .await
        );
        assert_eq!(fx.platform.catalog.entity_set_count(), count);
    }

    #[tokio::test]
    async fn test_reconciliation_needs_user_owner() {
        let fx = fixture().await;
        let org = Organization {
            id: OrganizationId::new_v4(),
            title: "Roles Only".into(),
        };
        fx.platform
            .organizations
            .add_organization(org.clone(), [Principal::role("admins")], vec![]);
        fx.service
            .install_app(fx.app.id, org.id, &org.title, &fx.owner)
            .await
            .unwrap();

        let (t2, _) = register_type(&fx.platform, &fx.service, "visit").await;
        let err = fx
            .service
            .add_app_types_to_app(fx.app.id, &BTreeSet::from([t2.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoUserOwner(id) if id == org.id));
    }

    #[tokio::test]
    async fn test_reconciliation_skips_configured_org_without_user_owner() {
        let mut fx = fixture().await;
        let recorder = Arc::new(RecordingObserver::<AppEvent>::new());
        fx.platform.observers.register(recorder.clone());

        let roles_only = Organization {
            id: OrganizationId::new_v4(),
            title: "Roles Only".into(),
        };
        fx.platform
            .organizations
            .add_organization(roles_only.clone(), [Principal::role("admins")], vec![]);
        fx.service
            .install_app(fx.app.id, roles_only.id, &roles_only.title, &fx.owner)
            .await
            .unwrap();
        install(&fx).await;
        let count = fx.platform.catalog.entity_set_count();

        assert_ok!(
            fx.service
                .add_app_types_to_app(fx.app.id, &BTreeSet::from([fx.t1.id]))
                .await
        );
        assert_eq!(fx.platform.catalog.entity_set_count(), count);

        let app = fx.service.get_app(fx.app.id).await.unwrap().unwrap();
        fx.dispatcher.drain().await;
        assert_eq!(recorder.events().last(), Some(&AppEvent::AppUpdated(app)));
    }

    #[tokio::test]
    async fn test_reconciliation_picks_smallest_user_owner() {
        let fx = fixture().await;
        fx.platform.organizations.add_owner(fx.org.id, Principal::user("a0"));
        fx.platform.organizations.add_owner(fx.org.id, Principal::role("admins"));
        install(&fx).await;

        let (t2, _) = register_type(&fx.platform, &fx.service, "visit").await;
        fx.service
            .add_app_types_to_app(fx.app.id, &BTreeSet::from([t2.id]))
            .await
            .unwrap();

        let es = setting(&fx, t2.id).await.unwrap().entity_set_id;
        assert_eq!(fx.platform.catalog.entity_set(es).unwrap().owner, Principal::user("a0"));
    }

    #[tokio::test]
    async fn test_remove_app_types_keeps_grants() {
        let fx = fixture().await;
        install(&fx).await;
        let es = setting(&fx, fx.t1.id).await.unwrap().entity_set_id;

        fx.service
            .remove_app_types_from_app(fx.app.id, &BTreeSet::from([fx.t1.id]))
            .await
            .unwrap();

        let app = fx.service.get_app(fx.app.id).await.unwrap().unwrap();
        assert!(app.app_type_ids.is_empty());
        assert!(setting(&fx, fx.t1.id).await.is_some());
        assert_eq!(fx.platform.collection_permissions(es, &fx.owner), Permission::all());
    }

    #[tokio::test]
    async fn test_config_update_regrants_app_principal() {
        let fx = fixture().await;
        install(&fx).await;
        let app_principal = AppPrincipalKey::new(fx.app.id, fx.org.id).principal();

        let replacement = EntitySetId::new_v4();
        fx.service
            .update_app_config_entity_set_id(fx.org.id, fx.app.id, fx.t1.id, replacement)
            .await
            .unwrap();
        assert_eq!(setting(&fx, fx.t1.id).await.unwrap().entity_set_id, replacement);
        assert_eq!(
            fx.platform.collection_permissions(replacement, &app_principal),
            [Permission::Read, Permission::Write].into_iter().collect::<PermissionSet>()
        );

        fx.service
            .update_app_config_permissions(fx.org.id, fx.app.id, fx.t1.id, Permission::all())
            .await
            .unwrap();
        assert_eq!(fx.platform.collection_permissions(replacement, &app_principal), Permission::all());

        let err = fx
            .service
            .update_app_config_permissions(OrganizationId::new_v4(), fx.app.id, fx.t1.id, Permission::all())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AppConfigNotFound(_)));
    }

    #[tokio::test]
    async fn test_available_configs_for_owner() {
        let fx = fixture().await;
        install(&fx).await;

        let configs = fx
            .service
            .get_available_configs(fx.app.id, &BTreeSet::from([fx.owner.clone()]), &[fx.org.clone()])
            .await
            .unwrap();

        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.principal, AppPrincipalKey::new(fx.app.id, fx.org.id).principal());
        assert_eq!(config.title, "A Title");
        assert_eq!(config.organization, fx.org);
        assert_eq!(config.config.keys().collect::<Vec<_>>(), vec!["app.person"]);
    }

    #[tokio::test]
    async fn test_available_configs_deny_partial_grants() {
        let fx = fixture().await;
        install(&fx).await;

        let reader = RolePrincipalKey::new(fx.org.id, "A Title", Permission::Read).principal();
        let stranger = Principal::user("stranger");
        for principals in [BTreeSet::from([reader]), BTreeSet::from([stranger])] {
            let configs = fx
                .service
                .get_available_configs(fx.app.id, &principals, &[fx.org.clone()])
                .await
                .unwrap();
            assert!(configs.is_empty());
        }
    }

    #[tokio::test]
    async fn test_available_configs_need_every_collection() {
        let fx = fixture().await;
        let (t2, _) = register_type(&fx.platform, &fx.service, "visit").await;
        let app = App::new("visits", "Visits", "", [fx.t1.id, t2.id]);
        fx.service.create_app(app.clone()).await.unwrap();
        fx.service
            .install_app(app.id, fx.org.id, &fx.org.title, &fx.owner)
            .await
            .unwrap();

        let configs = fx.service.engine().configs();
        let first = configs.get(&AppConfigKey::new(app.id, fx.org.id, fx.t1.id)).await.unwrap().unwrap();
        let second = configs.get(&AppConfigKey::new(app.id, fx.org.id, t2.id)).await.unwrap().unwrap();

        let analyst = Principal::user("analyst");
        let principals = BTreeSet::from([analyst.clone()]);
        fx.platform
            .authorizations
            .add_permission(&AclKey::collection(first.entity_set_id), &analyst, &Permission::all())
            .await
            .unwrap();

        let available = fx
            .service
            .get_available_configs(app.id, &principals, &[fx.org.clone()])
            .await
            .unwrap();
        assert!(available.is_empty());

        fx.platform
            .authorizations
            .add_permission(&AclKey::collection(second.entity_set_id), &analyst, &Permission::all())
            .await
            .unwrap();
        let available = fx
            .service
            .get_available_configs(app.id, &principals, &[fx.org.clone()])
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].config.len(), 2);
    }

    #[tokio::test]
    async fn test_available_configs_skip_orgs_without_app() {
        let fx = fixture().await;
        install(&fx).await;
        let other = Organization {
            id: OrganizationId::new_v4(),
            title: "Other".into(),
        };

        let configs = fx
            .service
            .get_available_configs(fx.app.id, &BTreeSet::from([fx.owner.clone()]), &[other, fx.org.clone()])
            .await
            .unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].organization.id, fx.org.id);
    }

    /// Grants pass through, checks come back empty
    struct ForgetfulAuthorizations {
        inner: Arc<dyn AuthorizationService>,
    }

    #[async_trait]
    impl AuthorizationService for ForgetfulAuthorizations {
        async fn add_permission(&self, acl_key: &AclKey, principal: &Principal, permissions: &PermissionSet) -> ServiceResult<()> {
            self.inner.add_permission(acl_key, principal, permissions).await
        }

        async fn access_checks_for_principals(
            &self,
            _checks: &[AccessCheck],
            _principals: &BTreeSet<Principal>,
        ) -> ServiceResult<Vec<Authorization>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_missing_authorization_record_denies() {
        let fx = fixture().await;
        let registry = fx.service.registry().clone();
        let engine = InstallationEngine::new(
            registry.clone(),
            ConfigStore::new(fx.platform.app_configs.clone(), 4),
            RoleProvisioner::new(fx.platform.principals.clone()),
            EntitySetProvisioner::new(registry, fx.platform.catalog.clone(), fx.platform.organizations.clone()),
            Arc::new(ForgetfulAuthorizations {
                inner: fx.platform.authorizations.clone(),
            }),
            fx.platform.catalog.clone(),
            fx.platform.organizations.clone(),
            ProvisioningConfig::default(),
        );

        engine
            .install_app(fx.app.id, fx.org.id, &fx.org.title, &fx.owner)
            .await
            .unwrap();
        let configs = engine
            .get_available_configs(fx.app.id, &BTreeSet::from([fx.owner.clone()]), &[fx.org.clone()])
            .await
            .unwrap();
        assert!(configs.is_empty());
    }
}
