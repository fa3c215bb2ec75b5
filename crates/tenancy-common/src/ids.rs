//! Value Objects - identifiers and authorization primitives
//!
//! Value Objects are:
//! - Immutable
//! - Comparable by value (not identity)
//! - Self-validating

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh random id
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Underlying uuid
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| IdError::InvalidUuid(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// App template identifier
    AppId
);
uuid_id!(
    /// App type identifier
    AppTypeId
);
uuid_id!(
    /// Tenant organization identifier
    OrganizationId
);
uuid_id!(
    /// Provisioned collection (entity set) identifier
    EntitySetId
);
uuid_id!(
    /// Schema (entity) type identifier
    EntityTypeId
);
uuid_id!(
    /// Schema property identifier
    PropertyTypeId
);

/// Identifier parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Not a uuid
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    /// Not one of the permission names
    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    /// Missing namespace or name
    #[error("invalid fully qualified name: {0}")]
    InvalidFqn(String),

    /// Not a `<org>|<title> - <PERMISSION>` role id
    #[error("invalid principal key: {0}")]
    InvalidPrincipalKey(String),
}

/// Permission that can be granted on a securable scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// See that the scope exists
    Discover,
    /// Reference the scope from other collections
    Link,
    /// Read data
    Read,
    /// Write data
    Write,
    /// Manage the scope and its grants
    Owner,
}

/// Ordered permission set
pub type PermissionSet = BTreeSet<Permission>;

impl Permission {
    /// Full permission set granted to app and owner principals
    pub fn all() -> PermissionSet {
        [Self::Discover, Self::Link, Self::Read, Self::Write, Self::Owner]
            .into_iter()
            .collect()
    }

    /// Canonical upper-case name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discover => "DISCOVER",
            Self::Link => "LINK",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Owner => "OWNER",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Permission {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DISCOVER" => Ok(Self::Discover),
            "LINK" => Ok(Self::Link),
            "READ" => Ok(Self::Read),
            "WRITE" => Ok(Self::Write),
            "OWNER" => Ok(Self::Owner),
            other => Err(IdError::InvalidPermission(other.to_string())),
        }
    }
}

/// Kind of identity holding permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    /// Human user
    User,
    /// Role within an organization
    Role,
    /// App service principal, one per (app, organization)
    App,
}

/// Identity that can hold permissions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Identity kind
    pub kind: PrincipalType,
    /// Opaque id, unique within the kind
    pub id: String,
}

impl Principal {
    /// Principal of any kind
    pub fn new(kind: PrincipalType, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    /// User principal
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(PrincipalType::User, id)
    }

    /// Role principal
    pub fn role(id: impl Into<String>) -> Self {
        Self::new(PrincipalType::Role, id)
    }

    /// App principal
    pub fn app(id: impl Into<String>) -> Self {
        Self::new(PrincipalType::App, id)
    }

    /// True for [`PrincipalType::User`]
    pub fn is_user(&self) -> bool {
        self.kind == PrincipalType::User
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

/// Ordered scope path that authorization grants attach to
///
/// # Invariants
/// - Either `[collection]` or `[collection, property]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclKey(Vec<Uuid>);

impl AclKey {
    /// Collection-level scope
    pub fn collection(entity_set_id: EntitySetId) -> Self {
        Self(vec![entity_set_id.as_uuid()])
    }

    /// Property-level scope under a collection
    pub fn property(entity_set_id: EntitySetId, property_id: PropertyTypeId) -> Self {
        Self(vec![entity_set_id.as_uuid(), property_id.as_uuid()])
    }

    /// Collection this scope belongs to
    pub fn entity_set_id(&self) -> Option<EntitySetId> {
        self.0.first().copied().map(EntitySetId::from)
    }

    /// Innermost component of the path
    pub fn last(&self) -> Option<Uuid> {
        self.0.last().copied()
    }

    /// True for `[collection]`, false for `[collection, property]`
    pub fn is_collection_scope(&self) -> bool {
        self.0.len() == 1
    }
}

impl fmt::Display for AclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Uuid::to_string).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

/// Namespaced type name, e.g. `app.person`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FullQualifiedName {
    /// Part before the last `.`
    pub namespace: String,
    /// Part after the last `.`
    pub name: String,
}

impl FullQualifiedName {
    /// Name from its two parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl FromStr for FullQualifiedName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(IdError::InvalidFqn(s.to_string())),
        }
    }
}

impl fmt::Display for FullQualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Typed key behind a role principal id.
///
/// Serialized as `<org>|<app title> - <PERMISSION>`. The organization is a
/// fixed-width uuid and the permission a closed suffix, so distinct keys never
/// serialize to the same id whatever the title contains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RolePrincipalKey {
    /// Organization the role lives in
    pub organization_id: OrganizationId,
    /// Title of the app the role belongs to
    pub app_title: String,
    /// The one permission the role carries
    pub permission: Permission,
}

impl RolePrincipalKey {
    /// Key for one (organization, app title, permission)
    pub fn new(organization_id: OrganizationId, app_title: impl Into<String>, permission: Permission) -> Self {
        Self {
            organization_id,
            app_title: app_title.into(),
            permission,
        }
    }

    /// Role title, `<app title> - <PERMISSION>`
    pub fn title(&self) -> String {
        format!("{} - {}", self.app_title, self.permission)
    }

    /// Role principal whose id is this key
    pub fn principal(&self) -> Principal {
        Principal::role(self.to_string())
    }

    /// Parse a role principal id back into its key
    pub fn parse(id: &str) -> Result<Self, IdError> {
        let invalid = || IdError::InvalidPrincipalKey(id.to_string());
        let (org, rest) = id.split_once('|').ok_or_else(invalid)?;
        let (title, permission) = rest.rsplit_once(" - ").ok_or_else(invalid)?;
        Ok(Self {
            organization_id: org.parse()?,
            app_title: title.to_string(),
            permission: permission.parse()?,
        })
    }
}

impl fmt::Display for RolePrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.organization_id, self.title())
    }
}

/// Typed key behind an app's per-organization service principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppPrincipalKey {
    /// Installed app
    pub app_id: AppId,
    /// Organization it is installed in
    pub organization_id: OrganizationId,
}

impl AppPrincipalKey {
    /// Key for one (app, organization)
    pub fn new(app_id: AppId, organization_id: OrganizationId) -> Self {
        Self { app_id, organization_id }
    }

    /// App principal whose id is this key
    pub fn principal(&self) -> Principal {
        Principal::app(self.to_string())
    }
}

impl fmt::Display for AppPrincipalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.app_id, self.organization_id)
    }
}
