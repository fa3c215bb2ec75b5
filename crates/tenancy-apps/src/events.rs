//! Domain Events
//!
//! Notifications emitted after app and app type mutations.

use tenancy_common::{AppId, AppTypeId};

use crate::model::{App, AppType};

/// All events in the app provisioning context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    AppCreated(App),
    /// Metadata or declared types changed
    AppUpdated(App),
    AppDeleted(AppId),
    AppTypeCreated(AppType),
    AppTypeUpdated(AppType),
    AppTypeDeleted(AppTypeId),
}

impl AppEvent {
    /// Get event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AppCreated(_) => "app.created",
            Self::AppUpdated(_) => "app.updated",
            Self::AppDeleted(_) => "app.deleted",
            Self::AppTypeCreated(_) => "app_type.created",
            Self::AppTypeUpdated(_) => "app_type.updated",
            Self::AppTypeDeleted(_) => "app_type.deleted",
        }
    }

    /// Id of the record the event is about
    pub fn subject_id(&self) -> uuid::Uuid {
        match self {
            Self::AppCreated(app) | Self::AppUpdated(app) => app.id.as_uuid(),
            Self::AppDeleted(id) => id.as_uuid(),
            Self::AppTypeCreated(app_type) | Self::AppTypeUpdated(app_type) => app_type.id.as_uuid(),
            Self::AppTypeDeleted(id) => id.as_uuid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let id = AppId::new_v4();
        let event = AppEvent::AppDeleted(id);

        assert_eq!(event.event_type(), "app.deleted");
        assert_eq!(event.subject_id(), id.as_uuid());
    }
}
