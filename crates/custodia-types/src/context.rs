//! Request contexts submitted to the compliance pipeline.
//!
//! A [`RequestContext`] pairs an [`ActorIdentity`] with the resource,
//! action, and rule category of one inbound operation. It is the primary
//! input to rate limiting, quarantine checks, rule evaluation, and audit
//! event construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CustodiaError;

/// The identities attached to a request, all optional.
///
/// Checks that walk these identities (quarantine, per-scope rate limits) use
/// the fixed priority order address, then principal, then session --
/// network-level identity carries the highest risk signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    /// Authenticated principal id, if any.
    pub principal: Option<String>,
    /// Network address the request originated from.
    pub address: Option<String>,
    /// Role claimed by the principal (informational; not an identity key).
    pub role: Option<String>,
    /// Session id, if the request belongs to an established session.
    pub session: Option<String>,
}

impl ActorIdentity {
    /// An identity with no attributes set.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Set the principal id.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Set the network address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the session id.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// One inbound operation, as seen by the compliance pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique identifier for this request instance.
    pub id: Uuid,
    /// When the request entered the pipeline.
    pub timestamp: DateTime<Utc>,
    /// Who is performing the operation.
    pub actor: ActorIdentity,
    /// The resource being operated on (e.g. `"document/1234"`).
    pub resource: String,
    /// The operation being performed (e.g. `"document.share"`).
    pub action: String,
    /// Rule category the operation falls under; selects applicable rules.
    pub category: String,
    /// Free-form metadata recorded alongside the audit event.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Sensitive payload that must never be stored in plaintext once the
    /// resulting audit event is sealed.
    pub sensitive_payload: Option<serde_json::Value>,
}

impl RequestContext {
    /// Create a new context with an auto-generated id and current timestamp.
    pub fn new(
        actor: ActorIdentity,
        resource: impl Into<String>,
        action: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor,
            resource: resource.into(),
            action: action.into(),
            category: category.into(),
            metadata: serde_json::Map::new(),
            sensitive_payload: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a sensitive payload.
    pub fn with_sensitive_payload(mut self, payload: serde_json::Value) -> Self {
        self.sensitive_payload = Some(payload);
        self
    }

    /// Reject malformed contexts before they enter the pipeline.
    ///
    /// Resource, action, and category must all be non-empty; anything else
    /// would produce unauditable events and unmatchable rule categories.
    pub fn validate(&self) -> Result<(), CustodiaError> {
        if self.resource.trim().is_empty() {
            return Err(CustodiaError::Validation("resource must not be empty".into()));
        }
        if self.action.trim().is_empty() {
            return Err(CustodiaError::Validation("action must not be empty".into()));
        }
        if self.category.trim().is_empty() {
            return Err(CustodiaError::Validation("category must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_validates_when_complete() {
        let ctx = RequestContext::new(
            ActorIdentity::anonymous().with_principal("user-1"),
            "document/42",
            "document.read",
            "data-access",
        );
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn context_rejects_empty_fields() {
        let actor = ActorIdentity::anonymous();
        assert!(RequestContext::new(actor.clone(), "", "a", "c").validate().is_err());
        assert!(RequestContext::new(actor.clone(), "r", " ", "c").validate().is_err());
        assert!(RequestContext::new(actor, "r", "a", "").validate().is_err());
    }

    #[test]
    fn actor_builder_sets_fields() {
        let actor = ActorIdentity::anonymous()
            .with_principal("p")
            .with_address("10.0.0.1")
            .with_role("attorney")
            .with_session("s-1");
        assert_eq!(actor.principal.as_deref(), Some("p"));
        assert_eq!(actor.address.as_deref(), Some("10.0.0.1"));
        assert_eq!(actor.role.as_deref(), Some("attorney"));
        assert_eq!(actor.session.as_deref(), Some("s-1"));
    }

    #[test]
    fn context_serialization_roundtrip() {
        let ctx = RequestContext::new(
            ActorIdentity::anonymous().with_address("192.0.2.1"),
            "matter/9",
            "matter.close",
            "case-management",
        )
        .with_metadata("firm", serde_json::json!("acme-legal"))
        .with_sensitive_payload(serde_json::json!({"client": "confidential"}));

        let json = serde_json::to_string(&ctx).unwrap();
        let back: RequestContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resource, "matter/9");
        assert_eq!(back.metadata["firm"], serde_json::json!("acme-legal"));
        assert!(back.sensitive_payload.is_some());
    }
}
