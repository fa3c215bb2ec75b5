//! App Registry - CRUD for apps and app types
//!
//! Every record is written only after its id and name are reserved, and
//! observers hear about a change only after the change is stored.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tenancy_common::{
    apply_atomic, AppId, AppTypeId, EventBus, FullQualifiedName, KeyValueStore,
};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::events::AppEvent;
use crate::model::{App, AppMetadataUpdate, AppType, AppTypeMetadataUpdate};
use crate::ports::NameReservations;

/// Registry of app templates and app types
pub struct AppRegistry {
    apps: Arc<dyn KeyValueStore<AppId, App>>,
    app_types: Arc<dyn KeyValueStore<AppTypeId, AppType>>,
    reservations: Arc<dyn NameReservations>,
    events: EventBus<AppEvent>,
    cas_max_attempts: u32,
}

impl AppRegistry {
    pub fn new(
        apps: Arc<dyn KeyValueStore<AppId, App>>,
        app_types: Arc<dyn KeyValueStore<AppTypeId, AppType>>,
        reservations: Arc<dyn NameReservations>,
        events: EventBus<AppEvent>,
        cas_max_attempts: u32,
    ) -> Self {
        Self {
            apps,
            app_types,
            reservations,
            events,
            cas_max_attempts,
        }
    }

    pub(crate) fn post(&self, event: AppEvent) {
        debug!(event_type = event.event_type(), subject = %event.subject_id(), "posting event");
        self.events.post(event);
    }

    // =========================================================================
    // Apps
    // =========================================================================

    pub async fn create_app(&self, app: App) -> AppResult<AppId> {
        if !self.reservations.reserve(app.id.as_uuid(), &app.name).await? {
            return Err(AppError::NameUnavailable(app.name));
        }
        self.apps.put(app.id, app.clone()).await?;
        info!(app_id = %app.id, name = %app.name, "app created");

        let id = app.id;
        self.post(AppEvent::AppCreated(app));
        Ok(id)
    }

    pub async fn delete_app(&self, app_id: AppId) -> AppResult<()> {
        self.apps.delete(&app_id).await?;
        self.reservations.release(app_id.as_uuid()).await?;
        info!(%app_id, "app deleted");

        self.post(AppEvent::AppDeleted(app_id));
        Ok(())
    }

    pub async fn get_app(&self, app_id: AppId) -> AppResult<Option<App>> {
        Ok(self.apps.get(&app_id).await?.map(|stored| stored.value))
    }

    /// Load an app or fail with [`AppError::AppNotFound`]
    pub async fn require_app(&self, app_id: AppId) -> AppResult<App> {
        self.get_app(app_id).await?.ok_or(AppError::AppNotFound(app_id))
    }

    pub async fn get_app_by_name(&self, name: &str) -> AppResult<Option<App>> {
        match self.reservations.lookup(name).await? {
            Some(id) => self.get_app(AppId::from(id)).await,
            None => Ok(None),
        }
    }

    /// All apps, ordered by name
    pub async fn get_apps(&self) -> AppResult<Vec<App>> {
        let mut apps: Vec<App> = self.apps.entries().await?.into_iter().map(|(_, app)| app).collect();
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }

    pub async fn update_app_metadata(&self, app_id: AppId, update: &AppMetadataUpdate) -> AppResult<App> {
        let current = self.require_app(app_id).await?;
        if let Some(name) = update.name.as_deref().filter(|name| *name != current.name) {
            if !self.reservations.rename(app_id.as_uuid(), name).await? {
                return Err(AppError::NameUnavailable(name.to_string()));
            }
        }

        let app = apply_atomic(self.apps.as_ref(), &app_id, self.cas_max_attempts, |app| {
            app.with_metadata(update)
        })
        .await?
        .ok_or(AppError::AppNotFound(app_id))?;

        self.post(AppEvent::AppUpdated(app.clone()));
        Ok(app)
    }

    /// Merge types into the app's declared set
    pub async fn add_app_types(&self, app_id: AppId, app_type_ids: &BTreeSet<AppTypeId>) -> AppResult<App> {
        apply_atomic(self.apps.as_ref(), &app_id, self.cas_max_attempts, |app| {
            let mut app = app.clone();
            app.app_type_ids.extend(app_type_ids.iter().copied());
            app
        })
        .await?
        .ok_or(AppError::AppNotFound(app_id))
    }

    /// Drop types from the app's declared set
    pub async fn remove_app_types(&self, app_id: AppId, app_type_ids: &BTreeSet<AppTypeId>) -> AppResult<App> {
        apply_atomic(self.apps.as_ref(), &app_id, self.cas_max_attempts, |app| {
            let mut app = app.clone();
            app.app_type_ids.retain(|id| !app_type_ids.contains(id));
            app
        })
        .await?
        .ok_or(AppError::AppNotFound(app_id))
    }

    // =========================================================================
    // App types
    // =========================================================================

    pub async fn create_app_type(&self, app_type: AppType) -> AppResult<AppTypeId> {
        let name = app_type.reserved_name();
        if !self.reservations.reserve(app_type.id.as_uuid(), &name).await? {
            return Err(AppError::NameUnavailable(name));
        }
        self.app_types.put_if_absent(app_type.id, app_type.clone()).await?;
        info!(app_type_id = %app_type.id, %name, "app type created");

        let id = app_type.id;
        self.post(AppEvent::AppTypeCreated(app_type));
        Ok(id)
    }

    pub async fn delete_app_type(&self, app_type_id: AppTypeId) -> AppResult<()> {
        self.app_types.delete(&app_type_id).await?;
        self.reservations.release(app_type_id.as_uuid()).await?;
        info!(%app_type_id, "app type deleted");

        self.post(AppEvent::AppTypeDeleted(app_type_id));
        Ok(())
    }

    pub async fn get_app_type(&self, app_type_id: AppTypeId) -> AppResult<Option<AppType>> {
        Ok(self.app_types.get(&app_type_id).await?.map(|stored| stored.value))
    }

    pub async fn require_app_type(&self, app_type_id: AppTypeId) -> AppResult<AppType> {
        self.get_app_type(app_type_id)
            .await?
            .ok_or(AppError::AppTypeNotFound(app_type_id))
    }

    pub async fn get_app_type_by_fqn(&self, fqn: &FullQualifiedName) -> AppResult<Option<AppType>> {
        match self.reservations.lookup(&fqn.to_string()).await? {
            Some(id) => self.get_app_type(AppTypeId::from(id)).await,
            None => Ok(None),
        }
    }

    /// All app types, ordered by type name
    pub async fn get_app_types(&self) -> AppResult<Vec<AppType>> {
        let mut app_types: Vec<AppType> = self
            .app_types
            .entries()
            .await?
            .into_iter()
            .map(|(_, app_type)| app_type)
            .collect();
        app_types.sort_by(|a, b| a.type_fqn.cmp(&b.type_fqn));
        Ok(app_types)
    }

    /// Bulk lookup; unknown ids are left out
    pub async fn get_app_types_by_ids(
        &self,
        app_type_ids: &BTreeSet<AppTypeId>,
    ) -> AppResult<BTreeMap<AppTypeId, AppType>> {
        let mut found = BTreeMap::new();
        for id in app_type_ids {
            if let Some(app_type) = self.get_app_type(*id).await? {
                found.insert(*id, app_type);
            }
        }
        Ok(found)
    }

    pub async fn update_app_type_metadata(
        &self,
        app_type_id: AppTypeId,
        update: &AppTypeMetadataUpdate,
    ) -> AppResult<AppType> {
        let current = self.require_app_type(app_type_id).await?;
        if let Some(fqn) = update.type_fqn.as_ref().filter(|fqn| **fqn != current.type_fqn) {
            let name = fqn.to_string();
            if !self.reservations.rename(app_type_id.as_uuid(), &name).await? {
                return Err(AppError::NameUnavailable(name));
            }
        }

        let app_type = apply_atomic(self.app_types.as_ref(), &app_type_id, self.cas_max_attempts, |t| {
            t.with_metadata(update)
        })
        .await?
        .ok_or(AppError::AppTypeNotFound(app_type_id))?;

        self.post(AppEvent::AppTypeUpdated(app_type.clone()));
        Ok(app_type)
    }

    // =========================================================================
    // Collection naming
    // =========================================================================

    /// Deterministic collection name for an app type, disambiguated
    /// against names already reserved
    pub async fn format_entity_set_name(&self, prefix: &str, fqn: &FullQualifiedName) -> AppResult<String> {
        let base = sanitize_entity_set_name(prefix, fqn);
        self.next_available_name(&base).await
    }

    /// `name`, else `name_1`, `name_2`, ... until one is free.
    ///
    /// Unbounded: a caller reserving every candidate keeps this probing.
    pub async fn next_available_name(&self, name: &str) -> AppResult<String> {
        let mut attempt = name.to_string();
        let mut counter: u64 = 1;
        while self.reservations.is_reserved(&attempt).await? {
            attempt = format!("{}_{}", name, counter);
            counter += 1;
        }
        Ok(attempt)
    }
}

/// `prefix_namespace_name`, lowercased and stripped to `[a-z0-9_]`
pub fn sanitize_entity_set_name(prefix: &str, fqn: &FullQualifiedName) -> String {
    format!("{}_{}_{}", prefix, fqn.namespace, fqn.name)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}
