//! Provisioning Configuration

use serde::{Deserialize, Serialize};
use tenancy_common::{Permission, PermissionSet};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// One role is provisioned per permission on install
    pub role_permissions: PermissionSet,
    /// The app's own permissions recorded in every new setting
    pub app_baseline_permissions: PermissionSet,
    /// Permissions both caller and app must hold for a config to be available
    pub availability_permissions: PermissionSet,
    /// Compare-and-swap budget for single-key updates
    pub cas_max_attempts: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            role_permissions: [Permission::Read, Permission::Write, Permission::Owner]
                .into_iter()
                .collect(),
            app_baseline_permissions: [Permission::Read, Permission::Write].into_iter().collect(),
            availability_permissions: [Permission::Read, Permission::Write, Permission::Owner]
                .into_iter()
                .collect(),
            cas_max_attempts: 16,
        }
    }
}

impl ProvisioningConfig {
    /// Load from file
    pub fn load(path: &str) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save to file
    pub fn save(&self, path: &str) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisioningConfig::default();

        assert_eq!(config.role_permissions.len(), 3);
        assert!(!config.app_baseline_permissions.contains(&Permission::Owner));
        assert!(config.availability_permissions.contains(&Permission::Owner));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ProvisioningConfig = serde_json::from_str(r#"{"cas_max_attempts": 3}"#).unwrap();

        assert_eq!(config.cas_max_attempts, 3);
        assert_eq!(config.role_permissions, ProvisioningConfig::default().role_permissions);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("provisioning-{}.json", uuid::Uuid::new_v4()));
        let path = path.to_string_lossy().to_string();

        let mut config = ProvisioningConfig::default();
        config.cas_max_attempts = 5;
        config.save(&path).unwrap();

        let loaded = ProvisioningConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_file(&path).unwrap();
    }
}
