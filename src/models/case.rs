//! Tracked cases and tenant scoping.

use serde::{Deserialize, Serialize};

use crate::services::identifier;

/// Tenant scope every lookup and write is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    pub org_id: String,

    /// Narrow case lookups to one office of the organization
    #[serde(default)]
    pub office_id: Option<String>,
}

impl TenantScope {
    pub fn org(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            office_id: None,
        }
    }

    pub fn with_office(mut self, office_id: impl Into<String>) -> Self {
        self.office_id = Some(office_id.into());
        self
    }

    /// Whether a case belongs to this scope.
    pub fn contains(&self, case: &TrackedCase) -> bool {
        case.org_id == self.org_id
            && self
                .office_id
                .as_ref()
                .is_none_or(|office| case.office_id.as_ref() == Some(office))
    }
}

/// A legal matter registered by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedCase {
    pub id: String,
    pub org_id: String,

    #[serde(default)]
    pub office_id: Option<String>,

    /// Case identifier as registered (punctuated or bare digits)
    pub case_number: String,

    #[serde(default)]
    pub title: String,

    /// Lawyer responsible for the case
    #[serde(default)]
    pub responsible_user_id: Option<String>,

    /// Whether identifier-based monitoring is active
    #[serde(default = "default_monitoring")]
    pub monitoring_enabled: bool,
}

fn default_monitoring() -> bool {
    true
}

impl TrackedCase {
    /// Digits-only form of the case identifier.
    pub fn identifier_digits(&self) -> String {
        identifier::normalize(&self.case_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(office: Option<&str>) -> TrackedCase {
        TrackedCase {
            id: "case-1".into(),
            org_id: "org-1".into(),
            office_id: office.map(String::from),
            case_number: "1234567-12.2023.8.26.0100".into(),
            title: String::new(),
            responsible_user_id: None,
            monitoring_enabled: true,
        }
    }

    #[test]
    fn test_scope_contains() {
        let org = TenantScope::org("org-1");
        assert!(org.contains(&case(None)));
        assert!(org.contains(&case(Some("sp"))));

        let office = TenantScope::org("org-1").with_office("sp");
        assert!(office.contains(&case(Some("sp"))));
        assert!(!office.contains(&case(Some("rj"))));
        assert!(!office.contains(&case(None)));

        assert!(!TenantScope::org("org-2").contains(&case(None)));
    }

    #[test]
    fn test_identifier_digits() {
        assert_eq!(case(None).identifier_digits(), "12345671220238260100");
    }
}
