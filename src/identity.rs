//! identity.rs — bearer-token verification seam and admin policy.
//!
//! The token technology itself lives outside this crate; the gate only needs
//! a verifier returning the subject identity plus claims. Admin status is
//! resolved from the verified identity by an injected [`AdminPolicy`], not
//! read from globals, so the gate stays testable in isolation.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::warn;

/// Identity extracted from a verified bearer token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: Option<String>,
    /// Explicit admin claim carried by the token itself.
    pub admin_claim: bool,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify a raw bearer token; any error means 401 at the HTTP surface.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity>;
}

/// Operator-configured admin resolution.
///
/// Order: explicit token claim, then allow-list membership, then the legacy
/// single-email fallback. The fallback exists only as a migration shim; when
/// it decides the outcome we warn once per process so the deployment owner
/// notices the allow-list was never configured.
#[derive(Debug, Default)]
pub struct AdminPolicy {
    allowlist: Vec<String>,
    legacy_admin_email: Option<String>,
    legacy_warned: OnceCell<()>,
}

impl AdminPolicy {
    pub fn new(allowlist: Vec<String>, legacy_admin_email: Option<String>) -> Self {
        Self {
            allowlist: allowlist
                .into_iter()
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            legacy_admin_email: legacy_admin_email
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty()),
            legacy_warned: OnceCell::new(),
        }
    }

    pub fn is_admin(&self, identity: &VerifiedIdentity) -> bool {
        if identity.admin_claim {
            return true;
        }
        let Some(email) = identity.email.as_deref() else {
            return false;
        };
        let email = email.to_ascii_lowercase();

        if self.allowlist.iter().any(|allowed| *allowed == email) {
            return true;
        }

        if self.legacy_admin_email.as_deref() == Some(email.as_str()) {
            self.legacy_warned.get_or_init(|| {
                warn!(
                    "admin resolved via legacy ADMIN_EMAIL fallback; \
                     configure ADMIN_EMAILS instead"
                );
            });
            return true;
        }
        false
    }
}

/// Token-to-identity lookup table; default wiring and tests.
#[derive(Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, identity: VerifiedIdentity) -> Self {
        self.tokens.insert(token.to_string(), identity);
        self
    }

    /// Read `DEV_BEARER_TOKENS` (empty verifier when unset, i.e. every
    /// request is rejected until a real verifier is wired in).
    pub fn from_env() -> Self {
        std::env::var("DEV_BEARER_TOKENS")
            .map(|spec| Self::from_spec(&spec))
            .unwrap_or_default()
    }

    /// Spec format: comma-separated `token:subject[:email[:admin]]`.
    pub fn from_spec(spec: &str) -> Self {
        let mut verifier = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split(':');
            let (Some(token), Some(subject)) = (parts.next(), parts.next()) else {
                continue;
            };
            if token.is_empty() || subject.is_empty() {
                continue;
            }
            let email = parts.next().map(str::to_string).filter(|e| !e.is_empty());
            let admin_claim = parts.next() == Some("admin");
            verifier.tokens.insert(
                token.to_string(),
                VerifiedIdentity {
                    subject: subject.to_string(),
                    email,
                    admin_claim,
                },
            );
        }
        verifier
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| anyhow!("unknown bearer token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: Option<&str>, admin_claim: bool) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: "u1".into(),
            email: email.map(str::to_string),
            admin_claim,
        }
    }

    #[test]
    fn claim_wins_without_any_email() {
        let policy = AdminPolicy::new(vec![], None);
        assert!(policy.is_admin(&identity(None, true)));
        assert!(!policy.is_admin(&identity(None, false)));
    }

    #[test]
    fn allowlist_match_is_case_insensitive() {
        let policy = AdminPolicy::new(vec!["Ops@Example.com".into()], None);
        assert!(policy.is_admin(&identity(Some("ops@example.com"), false)));
        assert!(!policy.is_admin(&identity(Some("other@example.com"), false)));
    }

    #[test]
    fn legacy_fallback_matches_exactly() {
        let policy = AdminPolicy::new(vec![], Some("owner@example.com".into()));
        assert!(policy.is_admin(&identity(Some("owner@example.com"), false)));
        assert!(!policy.is_admin(&identity(Some("owner@example.org"), false)));
    }

    #[tokio::test]
    async fn spec_parsing_handles_email_and_admin_flags() {
        let verifier =
            StaticTokenVerifier::from_spec("t1:u1, t2:u2:ops@example.com:admin, :bad, lone");

        let plain = verifier.verify("t1").await.unwrap();
        assert_eq!(plain.subject, "u1");
        assert!(plain.email.is_none());
        assert!(!plain.admin_claim);

        let admin = verifier.verify("t2").await.unwrap();
        assert_eq!(admin.email.as_deref(), Some("ops@example.com"));
        assert!(admin.admin_claim);

        assert!(verifier.verify("lone").await.is_err(), "subject required");
    }

    #[tokio::test]
    async fn static_verifier_rejects_unknown_tokens() {
        let verifier = StaticTokenVerifier::new().with_token("tok", identity(None, false));
        assert!(verifier.verify("tok").await.is_ok());
        assert!(verifier.verify("nope").await.is_err());
    }
}
