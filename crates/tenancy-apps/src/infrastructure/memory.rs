//! In-memory collaborator implementations for tests, seeds and the demo binary

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tenancy_common::{
    AclKey, AppId, AppTypeId, EntitySetId, EntityTypeId, EventBus, EventDispatcher,
    InMemoryKeyValueStore, ObserverRegistry, OrganizationId, Permission, PermissionSet, Principal,
    PropertyTypeId,
};
use uuid::Uuid;

use crate::config::ProvisioningConfig;
use crate::config_store::ConfigStore;
use crate::engine::InstallationEngine;
use crate::entity_sets::EntitySetProvisioner;
use crate::events::AppEvent;
use crate::model::{
    AccessCheck, App, AppConfigKey, AppType, AppTypeSetting, Authorization, EntitySetDescriptor,
    Organization, Role,
};
use crate::ports::{
    AuthorizationService, EntityDataModel, NameReservations, OrganizationService, PrincipalsService,
    RoleCreation, ServiceError, ServiceResult,
};
use crate::registry::AppRegistry;
use crate::roles::RoleProvisioner;
use crate::service::AppService;

// =============================================================================
// Name reservations
// =============================================================================

#[derive(Default)]
struct ReservationIndex {
    by_name: HashMap<String, Uuid>,
    by_id: HashMap<Uuid, String>,
}

/// Id/name reservations shared by apps, app types and collections
#[derive(Default)]
pub struct InMemoryReservations {
    index: Mutex<ReservationIndex>,
}

impl InMemoryReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NameReservations for InMemoryReservations {
    async fn reserve(&self, id: Uuid, name: &str) -> ServiceResult<bool> {
        let mut index = self.index.lock();
        if let Some(held) = index.by_name.get(name) {
            return Ok(*held == id);
        }
        if index.by_id.contains_key(&id) {
            return Ok(false);
        }
        index.by_name.insert(name.to_string(), id);
        index.by_id.insert(id, name.to_string());
        Ok(true)
    }

    async fn is_reserved(&self, name: &str) -> ServiceResult<bool> {
        Ok(self.index.lock().by_name.contains_key(name))
    }

    async fn lookup(&self, name: &str) -> ServiceResult<Option<Uuid>> {
        Ok(self.index.lock().by_name.get(name).copied())
    }

    async fn rename(&self, id: Uuid, new_name: &str) -> ServiceResult<bool> {
        let mut index = self.index.lock();
        if index.by_name.contains_key(new_name) {
            return Ok(false);
        }
        let Some(old_name) = index.by_id.insert(id, new_name.to_string()) else {
            index.by_id.remove(&id);
            return Err(ServiceError::rejected("reservations", format!("id {} is not reserved", id)));
        };
        index.by_name.remove(&old_name);
        index.by_name.insert(new_name.to_string(), id);
        Ok(true)
    }

    async fn release(&self, id: Uuid) -> ServiceResult<()> {
        let mut index = self.index.lock();
        if let Some(name) = index.by_id.remove(&id) {
            index.by_name.remove(&name);
        }
        Ok(())
    }
}

// =============================================================================
// Authorizations
// =============================================================================

/// Grant table keyed by (scope, principal)
#[derive(Default)]
pub struct InMemoryAuthorizations {
    grants: DashMap<(AclKey, Principal), PermissionSet>,
}

impl InMemoryAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything `principal` holds on `acl_key`
    pub fn permissions_for(&self, acl_key: &AclKey, principal: &Principal) -> PermissionSet {
        self.grants
            .get(&(acl_key.clone(), principal.clone()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuthorizationService for InMemoryAuthorizations {
    async fn add_permission(
        &self,
        acl_key: &AclKey,
        principal: &Principal,
        permissions: &PermissionSet,
    ) -> ServiceResult<()> {
        self.grants
            .entry((acl_key.clone(), principal.clone()))
            .or_default()
            .extend(permissions.iter().copied());
        Ok(())
    }

    async fn access_checks_for_principals(
        &self,
        checks: &[AccessCheck],
        principals: &BTreeSet<Principal>,
    ) -> ServiceResult<Vec<Authorization>> {
        Ok(checks
            .iter()
            .map(|check| {
                let held: PermissionSet = principals
                    .iter()
                    .flat_map(|principal| self.permissions_for(&check.acl_key, principal))
                    .collect();
                Authorization {
                    acl_key: check.acl_key.clone(),
                    permissions: check
                        .permissions
                        .iter()
                        .map(|permission| (*permission, held.contains(permission)))
                        .collect(),
                }
            })
            .collect())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A materialized collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntitySet {
    pub owner: Principal,
    pub descriptor: EntitySetDescriptor,
}

/// Schema types and collections
pub struct InMemoryCatalog {
    entity_types: DashMap<EntityTypeId, Vec<PropertyTypeId>>,
    entity_sets: DashMap<EntitySetId, StoredEntitySet>,
    reservations: Arc<dyn NameReservations>,
}

impl InMemoryCatalog {
    /// Collection names are reserved through `reservations`
    pub fn new(reservations: Arc<dyn NameReservations>) -> Self {
        Self {
            entity_types: DashMap::new(),
            entity_sets: DashMap::new(),
            reservations,
        }
    }

    pub fn register_entity_type(
        &self,
        entity_type_id: EntityTypeId,
        properties: impl IntoIterator<Item = PropertyTypeId>,
    ) {
        self.entity_types
            .insert(entity_type_id, properties.into_iter().collect());
    }

    pub fn entity_set(&self, entity_set_id: EntitySetId) -> Option<StoredEntitySet> {
        self.entity_sets.get(&entity_set_id).map(|entry| entry.value().clone())
    }

    pub fn entity_set_count(&self) -> usize {
        self.entity_sets.len()
    }
}

#[async_trait]
impl EntityDataModel for InMemoryCatalog {
    async fn create_entity_set(
        &self,
        owner: &Principal,
        descriptor: EntitySetDescriptor,
    ) -> ServiceResult<EntitySetId> {
        if !self.entity_types.contains_key(&descriptor.entity_type_id) {
            return Err(ServiceError::rejected(
                "catalog",
                format!("unknown entity type {}", descriptor.entity_type_id),
            ));
        }

        let id = EntitySetId::new_v4();
        if !self.reservations.reserve(id.as_uuid(), &descriptor.name).await? {
            return Err(ServiceError::rejected(
                "catalog",
                format!("entity set name {} is taken", descriptor.name),
            ));
        }
        self.entity_sets.insert(
            id,
            StoredEntitySet {
                owner: owner.clone(),
                descriptor,
            },
        );
        Ok(id)
    }

    async fn get_entity_type_properties(
        &self,
        entity_type_id: EntityTypeId,
    ) -> ServiceResult<Vec<PropertyTypeId>> {
        self.entity_types
            .get(&entity_type_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::rejected("catalog", format!("unknown entity type {}", entity_type_id)))
    }
}

// =============================================================================
// Organizations
// =============================================================================

#[derive(Debug, Clone)]
struct OrganizationRecord {
    organization: Organization,
    owners: BTreeSet<Principal>,
    partitions: Vec<i32>,
    apps: BTreeSet<AppId>,
}

/// Organization directory
#[derive(Default)]
pub struct InMemoryOrganizations {
    organizations: RwLock<HashMap<OrganizationId, OrganizationRecord>>,
}

impl InMemoryOrganizations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_organization(
        &self,
        organization: Organization,
        owners: impl IntoIterator<Item = Principal>,
        partitions: Vec<i32>,
    ) {
        let record = OrganizationRecord {
            owners: owners.into_iter().collect(),
            partitions,
            apps: BTreeSet::new(),
            organization,
        };
        self.organizations.write().insert(record.organization.id, record);
    }

    pub fn add_owner(&self, id: OrganizationId, owner: Principal) {
        if let Some(record) = self.organizations.write().get_mut(&id) {
            record.owners.insert(owner);
        }
    }

    pub fn organizations(&self) -> Vec<Organization> {
        let mut organizations: Vec<Organization> = self
            .organizations
            .read()
            .values()
            .map(|record| record.organization.clone())
            .collect();
        organizations.sort_by(|a, b| a.title.cmp(&b.title));
        organizations
    }
}

#[async_trait]
impl OrganizationService for InMemoryOrganizations {
    async fn get_organization(&self, id: OrganizationId) -> ServiceResult<Option<Organization>> {
        Ok(self
            .organizations
            .read()
            .get(&id)
            .map(|record| record.organization.clone()))
    }

    async fn get_owners(&self, id: OrganizationId) -> ServiceResult<BTreeSet<Principal>> {
        Ok(self
            .organizations
            .read()
            .get(&id)
            .map(|record| record.owners.clone())
            .unwrap_or_default())
    }

    async fn get_default_partitions(&self, id: OrganizationId) -> ServiceResult<Vec<i32>> {
        Ok(self
            .organizations
            .read()
            .get(&id)
            .map(|record| record.partitions.clone())
            .unwrap_or_default())
    }

    async fn add_app_to_org(&self, id: OrganizationId, app_id: AppId) -> ServiceResult<()> {
        match self.organizations.write().get_mut(&id) {
            Some(record) => {
                record.apps.insert(app_id);
                Ok(())
            }
            None => Err(ServiceError::rejected("organizations", format!("unknown organization {}", id))),
        }
    }

    async fn get_organization_apps(&self, id: OrganizationId) -> ServiceResult<BTreeSet<AppId>> {
        Ok(self
            .organizations
            .read()
            .get(&id)
            .map(|record| record.apps.clone())
            .unwrap_or_default())
    }
}

// =============================================================================
// Principals
// =============================================================================

/// Role directory keyed by principal
#[derive(Default)]
pub struct InMemoryPrincipals {
    roles: RwLock<HashMap<Principal, Role>>,
}

impl InMemoryPrincipals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self, principal: &Principal) -> Option<Role> {
        self.roles.read().get(principal).cloned()
    }

    pub fn role_count(&self) -> usize {
        self.roles.read().len()
    }
}

#[async_trait]
impl PrincipalsService for InMemoryPrincipals {
    async fn create_role_if_not_exists(&self, _actor: &Principal, role: Role) -> ServiceResult<RoleCreation> {
        let mut roles = self.roles.write();
        if roles.contains_key(&role.principal) {
            return Ok(RoleCreation::AlreadyExists);
        }
        roles.insert(role.principal.clone(), role);
        Ok(RoleCreation::Created)
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Every collaborator and store wired together in memory
pub struct InMemoryPlatform {
    pub config: ProvisioningConfig,
    pub reservations: Arc<InMemoryReservations>,
    pub authorizations: Arc<InMemoryAuthorizations>,
    pub catalog: Arc<InMemoryCatalog>,
    pub organizations: Arc<InMemoryOrganizations>,
    pub principals: Arc<InMemoryPrincipals>,
    pub observers: Arc<ObserverRegistry<AppEvent>>,
    pub apps: Arc<InMemoryKeyValueStore<AppId, App>>,
    pub app_types: Arc<InMemoryKeyValueStore<AppTypeId, AppType>>,
    pub app_configs: Arc<InMemoryKeyValueStore<AppConfigKey, AppTypeSetting>>,
}

impl InMemoryPlatform {
    pub fn new(config: ProvisioningConfig) -> Self {
        let reservations = Arc::new(InMemoryReservations::new());
        Self {
            config,
            catalog: Arc::new(InMemoryCatalog::new(reservations.clone())),
            reservations,
            authorizations: Arc::new(InMemoryAuthorizations::new()),
            organizations: Arc::new(InMemoryOrganizations::new()),
            principals: Arc::new(InMemoryPrincipals::new()),
            observers: Arc::new(ObserverRegistry::new()),
            apps: Arc::new(InMemoryKeyValueStore::new()),
            app_types: Arc::new(InMemoryKeyValueStore::new()),
            app_configs: Arc::new(InMemoryKeyValueStore::new()),
        }
    }

    /// Wire the service over this platform's state.
    ///
    /// Events stay queued until the returned dispatcher is drained or spawned.
    pub fn build_service(&self) -> (AppService, EventDispatcher<AppEvent>) {
        let (bus, dispatcher) = EventBus::channel(self.observers.clone());
        let attempts = self.config.cas_max_attempts;

        let registry = Arc::new(AppRegistry::new(
            self.apps.clone(),
            self.app_types.clone(),
            self.reservations.clone(),
            bus,
            attempts,
        ));
        let roles = RoleProvisioner::new(self.principals.clone());
        let entity_sets = EntitySetProvisioner::new(
            registry.clone(),
            self.catalog.clone(),
            self.organizations.clone(),
        );
        let engine = InstallationEngine::new(
            registry.clone(),
            ConfigStore::new(self.app_configs.clone(), attempts),
            roles,
            entity_sets,
            self.authorizations.clone(),
            self.catalog.clone(),
            self.organizations.clone(),
            self.config.clone(),
        );
        (AppService::new(registry, engine), dispatcher)
    }

    /// Collection-scope grants of one principal
    pub fn collection_permissions(&self, entity_set_id: EntitySetId, principal: &Principal) -> PermissionSet {
        self.authorizations
            .permissions_for(&AclKey::collection(entity_set_id), principal)
    }

    /// True when `principal` holds `permission` on the collection and every property
    pub fn holds_everywhere(
        &self,
        entity_set_id: EntitySetId,
        properties: &[PropertyTypeId],
        principal: &Principal,
        permission: Permission,
    ) -> bool {
        std::iter::once(AclKey::collection(entity_set_id))
            .chain(properties.iter().map(|p| AclKey::property(entity_set_id, *p)))
            .all(|acl_key| self.authorizations.permissions_for(&acl_key, principal).contains(&permission))
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new(ProvisioningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reservation_is_exclusive() {
        let reservations = InMemoryReservations::new();
        let first = Uuid::new_v4();

        assert!(reservations.reserve(first, "survey").await.unwrap());
        assert!(reservations.reserve(first, "survey").await.unwrap());
        assert!(!reservations.reserve(Uuid::new_v4(), "survey").await.unwrap());
        assert!(!reservations.reserve(first, "other").await.unwrap());
        assert_eq!(reservations.lookup("survey").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_rename_and_release() {
        let reservations = InMemoryReservations::new();
        let id = Uuid::new_v4();
        reservations.reserve(id, "old").await.unwrap();
        reservations.reserve(Uuid::new_v4(), "taken").await.unwrap();

        assert!(!reservations.rename(id, "taken").await.unwrap());
        assert!(reservations.rename(id, "new").await.unwrap());
        assert!(!reservations.is_reserved("old").await.unwrap());

        reservations.release(id).await.unwrap();
        assert!(!reservations.is_reserved("new").await.unwrap());
        assert_eq!(reservations.len(), 1);

        let err = reservations.rename(Uuid::new_v4(), "fresh").await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
        assert!(!reservations.is_reserved("fresh").await.unwrap());
    }

    fn check_permissions() -> PermissionSet {
        [Permission::Read, Permission::Write, Permission::Owner].into_iter().collect()
    }

    #[tokio::test]
    async fn test_access_checks_union_principals() {
        let authorizations = InMemoryAuthorizations::new();
        let acl_key = AclKey::collection(EntitySetId::new_v4());
        let alice = Principal::user("alice");
        let readers = Principal::role("readers");

        authorizations
            .add_permission(&acl_key, &alice, &[Permission::Write].into_iter().collect())
            .await
            .unwrap();
        authorizations
            .add_permission(&acl_key, &readers, &[Permission::Read].into_iter().collect())
            .await
            .unwrap();

        let check = AccessCheck {
            acl_key: acl_key.clone(),
            permissions: check_permissions(),
        };
        let results = authorizations
            .access_checks_for_principals(&[check], &[alice, readers].into_iter().collect())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].permissions.get(&Permission::Read), Some(&true));
        assert_eq!(results[0].permissions.get(&Permission::Owner), Some(&false));
        assert!(!results[0].grants_all(&check_permissions()));
    }

    #[tokio::test]
    async fn test_catalog_rejects_taken_name() {
        let reservations = Arc::new(InMemoryReservations::new());
        let catalog = InMemoryCatalog::new(reservations.clone());
        let entity_type_id = EntityTypeId::new_v4();
        catalog.register_entity_type(entity_type_id, [PropertyTypeId::new_v4()]);

        let descriptor = EntitySetDescriptor {
            entity_type_id,
            name: "acme_app_person".into(),
            title: "People (Acme)".into(),
            description: String::new(),
            contacts: BTreeSet::new(),
            organization_id: OrganizationId::new_v4(),
            flags: BTreeSet::new(),
            partitions: vec![1, 2],
        };
        let owner = Principal::user("alice");

        let id = catalog.create_entity_set(&owner, descriptor.clone()).await.unwrap();
        assert_eq!(catalog.entity_set(id).map(|set| set.descriptor.partitions), Some(vec![1, 2]));
        assert!(reservations.is_reserved("acme_app_person").await.unwrap());

        let err = catalog.create_entity_set(&owner, descriptor).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { service: "catalog", .. }));
        assert_eq!(catalog.entity_set_count(), 1);
    }

    #[tokio::test]
    async fn test_roles_created_once() {
        let principals = InMemoryPrincipals::new();
        let principal = Principal::role("org|Survey - READ");
        let role = Role {
            id: Uuid::new_v4(),
            organization_id: OrganizationId::new_v4(),
            principal: principal.clone(),
            title: "Survey - READ".into(),
            description: "READ permission for the Survey app".into(),
        };
        let actor = Principal::user("alice");

        let first = principals.create_role_if_not_exists(&actor, role.clone()).await.unwrap();
        let second = principals.create_role_if_not_exists(&actor, role).await.unwrap();

        assert_eq!(first, RoleCreation::Created);
        assert_eq!(second, RoleCreation::AlreadyExists);
        assert_eq!(principals.role_count(), 1);
        assert!(principals.role(&principal).is_some());
    }

    #[tokio::test]
    async fn test_unknown_organization_rejects_app() {
        let organizations = InMemoryOrganizations::new();
        let id = OrganizationId::new_v4();

        let err = organizations.add_app_to_org(id, AppId::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
        assert!(organizations.get_owners(id).await.unwrap().is_empty());
    }
}
