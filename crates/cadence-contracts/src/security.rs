//! Caller identity and validation outcome types for the security pipeline.

use serde::{Deserialize, Serialize};

use crate::audit::RiskScore;

/// Who is asking, as seen by the security validators.
///
/// `identifier` keys the rate limiter (a user ID, API key, or client
/// address). Permissions are the union of `permissions` and whatever the
/// configured roles grant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    pub identifier: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl SecurityContext {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            identifier: user_id.clone(),
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }
}

/// The merged verdict of every validator for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub risk_score: RiskScore,
}

impl ValidationOutcome {
    /// A passing outcome with no findings.
    pub fn pass() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            risk_score: RiskScore::ZERO,
        }
    }

    /// A failing outcome with a single error.
    pub fn reject(error: impl Into<String>, risk: impl Into<RiskScore>) -> Self {
        Self {
            is_valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
            risk_score: risk.into(),
        }
    }

    /// Fold another validator's outcome into this one.
    ///
    /// Errors and warnings concatenate; validity is the conjunction; the
    /// risk score is the maximum of the two.
    pub fn merge(mut self, other: ValidationOutcome) -> Self {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.risk_score = self.risk_score.max(other.risk_score);
        self
    }
}
