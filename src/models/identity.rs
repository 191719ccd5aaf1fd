//! Request identity and authorization gates.
//!
//! Every request carries exactly one [`Identity`] for its entire lifetime,
//! resolved once by the bearer-auth middleware and immutable thereafter.
//! The anonymous case is a distinguished enum variant rather than a shared
//! sentinel value, so identity checks are exhaustive pattern matches.
//!
//! Authorization is an ordered list of [`Gate`]s evaluated in sequence.
//! Permission implies activated implies authenticated: the gate chain for a
//! permission-protected route is always
//! `[Authenticated, Activated, Permission(code)]`, and evaluation
//! short-circuits on the first denial.

use crate::error::AppError;
use crate::models::user::User;

/// The identity attached to a request's execution context.
#[derive(Debug, Clone)]
pub enum Identity {
    /// No credential was presented. Not an error.
    Anonymous,
    /// A verified principal together with its permission codes, both loaded
    /// once during resolution.
    Authenticated {
        user: User,
        permissions: PermissionSet,
    },
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated { user, .. } => Some(user),
        }
    }
}

/// An ordered collection of capability codes, queried by exact membership.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet(Vec<String>);

impl PermissionSet {
    pub fn new(codes: Vec<String>) -> Self {
        Self(codes)
    }

    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One authorization predicate over an already-resolved [`Identity`].
///
/// Gates never re-resolve identity; they only inspect it.
#[derive(Debug, Clone)]
pub enum Gate {
    /// The identity must not be anonymous.
    Authenticated,
    /// The account must have completed activation.
    Activated,
    /// The permission set must contain the given capability code.
    Permission(String),
}

impl Gate {
    /// Evaluate this gate, returning the gate's distinct rejection on denial.
    pub fn check(&self, identity: &Identity) -> Result<(), AppError> {
        let (user, permissions) = match identity {
            Identity::Anonymous => return Err(AppError::AuthenticationRequired),
            Identity::Authenticated { user, permissions } => (user, permissions),
        };

        match self {
            Gate::Authenticated => Ok(()),
            Gate::Activated => {
                if user.activated {
                    Ok(())
                } else {
                    Err(AppError::AccountNotActivated)
                }
            }
            Gate::Permission(code) => {
                if permissions.includes(code) {
                    Ok(())
                } else {
                    Err(AppError::PermissionDenied)
                }
            }
        }
    }
}

/// Evaluate gates in order, short-circuiting on the first denial.
pub fn check_gates(gates: &[Gate], identity: &Identity) -> Result<(), AppError> {
    for gate in gates {
        gate.check(identity)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::user::Password;

    fn authenticated(activated: bool, codes: &[&str]) -> Identity {
        Identity::Authenticated {
            user: User {
                id: 1,
                created_at: Utc::now(),
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password: Password::from_hash(String::new()),
                activated,
                version: 1,
            },
            permissions: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_anonymous_is_exhaustively_matched() {
        assert!(Identity::Anonymous.is_anonymous());
        assert!(!authenticated(true, &[]).is_anonymous());
    }

    #[test]
    fn test_permission_set_exact_membership() {
        let set: PermissionSet = ["movies:read".to_string()].into_iter().collect();
        assert!(set.includes("movies:read"));
        assert!(!set.includes("movies:write"));
        assert!(!set.includes("movies"));
    }

    #[test]
    fn test_every_gate_rejects_anonymous() {
        let anon = Identity::Anonymous;
        for gate in [
            Gate::Authenticated,
            Gate::Activated,
            Gate::Permission("movies:read".to_string()),
        ] {
            assert!(matches!(
                gate.check(&anon),
                Err(AppError::AuthenticationRequired)
            ));
        }
    }

    #[test]
    fn test_activated_gate() {
        let inactive = authenticated(false, &[]);
        assert!(matches!(
            Gate::Activated.check(&inactive),
            Err(AppError::AccountNotActivated)
        ));

        let active = authenticated(true, &[]);
        assert!(Gate::Activated.check(&active).is_ok());
    }

    #[test]
    fn test_permission_gate_denies_activated_identity_without_code() {
        let identity = authenticated(true, &["movies:write"]);
        assert!(matches!(
            Gate::Permission("movies:read".to_string()).check(&identity),
            Err(AppError::PermissionDenied)
        ));
    }

    #[test]
    fn test_permission_gate_admits_identity_holding_code() {
        let identity = authenticated(true, &["movies:read"]);
        assert!(
            Gate::Permission("movies:read".to_string())
                .check(&identity)
                .is_ok()
        );
    }

    #[test]
    fn test_gate_chain_short_circuits_in_order() {
        let gates = vec![
            Gate::Authenticated,
            Gate::Activated,
            Gate::Permission("movies:read".to_string()),
        ];

        // An inactive account holding the code is still rejected by the
        // earlier gate: ordering is part of the contract.
        let inactive = authenticated(false, &["movies:read"]);
        assert!(matches!(
            check_gates(&gates, &inactive),
            Err(AppError::AccountNotActivated)
        ));

        let active = authenticated(true, &["movies:read"]);
        assert!(check_gates(&gates, &active).is_ok());
    }
}
