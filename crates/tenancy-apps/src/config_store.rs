//! App config store: (app, organization, app type) → provisioning state

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tenancy_common::{apply_atomic, AppId, EntitySetId, KeyValueStore, PermissionSet};

use crate::error::{AppError, AppResult};
use crate::model::{AppConfigKey, AppTypeSetting};

/// Typed view over the app config key-value store
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore<AppConfigKey, AppTypeSetting>>,
    cas_max_attempts: u32,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore<AppConfigKey, AppTypeSetting>>, cas_max_attempts: u32) -> Self {
        Self {
            store,
            cas_max_attempts,
        }
    }

    /// Setting stored for `key`
    pub async fn get(&self, key: &AppConfigKey) -> AppResult<Option<AppTypeSetting>> {
        Ok(self.store.get(key).await?.map(|stored| stored.value))
    }

    /// True when `key` already has a setting
    pub async fn contains(&self, key: &AppConfigKey) -> AppResult<bool> {
        Ok(self.store.get(key).await?.is_some())
    }

    /// Write only if `key` has no setting yet; false if one was already there
    pub async fn put_if_absent(&self, key: AppConfigKey, setting: AppTypeSetting) -> AppResult<bool> {
        Ok(self.store.put_if_absent(key, setting).await?)
    }

    /// Settings present for `keys`; absent keys are left out
    pub async fn get_all(
        &self,
        keys: &[AppConfigKey],
    ) -> AppResult<BTreeMap<AppConfigKey, AppTypeSetting>> {
        let mut settings = BTreeMap::new();
        for key in keys {
            if let Some(stored) = self.store.get(key).await? {
                settings.insert(*key, stored.value);
            }
        }
        Ok(settings)
    }

    /// Every configured key of an app, across organizations
    pub async fn keys_for_app(&self, app_id: AppId) -> AppResult<BTreeSet<AppConfigKey>> {
        Ok(self
            .store
            .entries()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| key.app_id == app_id)
            .collect())
    }

    /// Point the setting at another collection
    pub async fn update_entity_set_id(
        &self,
        key: &AppConfigKey,
        entity_set_id: EntitySetId,
    ) -> AppResult<AppTypeSetting> {
        apply_atomic(self.store.as_ref(), key, self.cas_max_attempts, |setting| AppTypeSetting {
            entity_set_id,
            permissions: setting.permissions.clone(),
        })
        .await?
        .ok_or(AppError::AppConfigNotFound(*key))
    }

    /// Replace the app's baseline permissions
    pub async fn update_permissions(
        &self,
        key: &AppConfigKey,
        permissions: PermissionSet,
    ) -> AppResult<AppTypeSetting> {
        apply_atomic(self.store.as_ref(), key, self.cas_max_attempts, |setting| AppTypeSetting {
            entity_set_id: setting.entity_set_id,
            permissions: permissions.clone(),
        })
        .await?
        .ok_or(AppError::AppConfigNotFound(*key))
    }
}
