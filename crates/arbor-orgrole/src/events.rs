//! Mapping change events and the notifier seam.
//!
//! Pre-events are best-effort signals fired before an operation validates;
//! their failures are swallowed. Post-events fire after a successful store
//! commit and a failed publish there surfaces as a server error, since the
//! data change has already happened.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{OrgRoleError, Result};
use crate::types::{GrantRequest, OrgId, RoleId, UserId};

/// Trait for types published as mapping change events.
///
/// Convention for the type name: `arbor.orgrole.<entity>.<action>`.
pub trait MappingEvent: Serialize + Send + Sync {
    /// The fully qualified event type name.
    const EVENT_TYPE: &'static str;
}

/// Fired before an add-mappings call is validated.
#[derive(Debug, Clone, Serialize)]
pub struct RoleMappingsAssigning {
    pub organization_id: OrgId,
    pub role_id: RoleId,
    pub grants: Vec<GrantRequest>,
}

impl MappingEvent for RoleMappingsAssigning {
    const EVENT_TYPE: &'static str = "arbor.orgrole.role_mappings.assigning";
}

/// Fired after an add-mappings call commits.
///
/// Carries the issuing organization, role, and per-user cascade flags, not
/// the expanded row set.
#[derive(Debug, Clone, Serialize)]
pub struct RoleMappingsAssigned {
    pub organization_id: OrgId,
    pub role_id: RoleId,
    pub grants: Vec<GrantRequest>,
}

impl MappingEvent for RoleMappingsAssigned {
    const EVENT_TYPE: &'static str = "arbor.orgrole.role_mappings.assigned";
}

/// Fired before a single-grant delete is validated.
#[derive(Debug, Clone, Serialize)]
pub struct RoleMappingRevoking {
    pub organization_id: OrgId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub include_sub_orgs: bool,
}

impl MappingEvent for RoleMappingRevoking {
    const EVENT_TYPE: &'static str = "arbor.orgrole.role_mapping.revoking";
}

/// Fired after a single-grant delete commits.
#[derive(Debug, Clone, Serialize)]
pub struct RoleMappingRevoked {
    pub organization_id: OrgId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub include_sub_orgs: bool,
}

impl MappingEvent for RoleMappingRevoked {
    const EVENT_TYPE: &'static str = "arbor.orgrole.role_mapping.revoked";
}

/// Notification seam towards the platform event bus.
///
/// The transport (Kafka, webhooks, ...) is owned by the caller; the engine
/// only hands over a serialized payload under a stable event type name.
#[async_trait::async_trait]
pub trait EventNotifier: Send + Sync {
    /// Publish one event payload.
    async fn publish(
        &self,
        tenant_id: Uuid,
        event_type: &'static str,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Serialize and publish a typed event.
pub async fn publish_event<E: MappingEvent>(
    notifier: &dyn EventNotifier,
    tenant_id: Uuid,
    event: &E,
) -> Result<()> {
    let payload = serde_json::to_value(event).map_err(|e| OrgRoleError::EventPublishFailed {
        event: E::EVENT_TYPE.to_string(),
        cause: e.to_string(),
    })?;
    notifier.publish(tenant_id, E::EVENT_TYPE, payload).await
}

// ============================================================================
// In-Memory Notifiers (for testing)
// ============================================================================

/// A recorded event publication.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub tenant_id: Uuid,
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

/// Recording notifier for tests.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    events: Arc<RwLock<Vec<RecordedEvent>>>,
    // Event types whose publish should fail.
    failing: Arc<RwLock<Vec<&'static str>>>,
}

impl InMemoryNotifier {
    /// Create a notifier that records everything and never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make publishing the given event type fail from now on.
    pub async fn fail_on(&self, event_type: &'static str) {
        self.failing.write().await.push(event_type);
    }

    /// All recorded events, in publish order.
    pub async fn recorded(&self) -> Vec<RecordedEvent> {
        self.events.read().await.clone()
    }

    /// Recorded event types, in publish order.
    pub async fn recorded_types(&self) -> Vec<&'static str> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.event_type)
            .collect()
    }
}

#[async_trait::async_trait]
impl EventNotifier for InMemoryNotifier {
    async fn publish(
        &self,
        tenant_id: Uuid,
        event_type: &'static str,
        payload: serde_json::Value,
    ) -> Result<()> {
        if self.failing.read().await.contains(&event_type) {
            return Err(OrgRoleError::EventPublishFailed {
                event: event_type.to_string(),
                cause: "injected failure".to_string(),
            });
        }
        self.events.write().await.push(RecordedEvent {
            tenant_id,
            event_type,
            payload,
        });
        Ok(())
    }
}
