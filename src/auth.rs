/*!
 * Credential collaborator
 *
 * The adapter never prompts for or stores credentials itself. It asks a
 * [`UserAuthenticator`] for the pieces it needs, falls back to what the name
 * carries, and hands the data back for cleanup afterwards.
 */

use std::collections::HashMap;
use std::fmt;
use zeroize::Zeroizing;

use crate::config::SmbVfsConfig;
use crate::protocols::smb::AuthenticationContext;
use crate::vfs::name::EmbeddedCredentials;

/// Credential piece an authenticator can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthDataKind {
    Username,
    Password,
    Domain,
}

impl AuthDataKind {
    /// All kinds, in request order
    pub const ALL: [AuthDataKind; 3] = [
        AuthDataKind::Username,
        AuthDataKind::Password,
        AuthDataKind::Domain,
    ];
}

/// Credential values returned by an authenticator
///
/// Values are zeroed when removed, cleared or dropped.
#[derive(Default)]
pub struct UserAuthenticationData {
    values: HashMap<AuthDataKind, Zeroizing<String>>,
}

impl fmt::Debug for UserAuthenticationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAuthenticationData")
            .field("kinds", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl UserAuthenticationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: AuthDataKind, value: impl Into<String>) {
        self.values.insert(kind, Zeroizing::new(value.into()));
    }

    pub fn get(&self, kind: AuthDataKind) -> Option<&str> {
        self.values.get(&kind).map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop (and zero) every value
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Supplies credentials on demand
pub trait UserAuthenticator: Send + Sync {
    /// Return values for (some of) the requested kinds, or `None` to decline
    fn request_authentication(&self, kinds: &[AuthDataKind]) -> Option<UserAuthenticationData>;

    /// Called once for every value returned by `request_authentication`
    fn cleanup(&self, mut data: UserAuthenticationData) {
        data.clear();
    }
}

/// Authenticator handing out a fixed set of credentials
pub struct StaticUserAuthenticator {
    username: Option<Zeroizing<String>>,
    password: Option<Zeroizing<String>>,
    domain: Option<String>,
}

impl fmt::Debug for StaticUserAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticUserAuthenticator")
            .field("username", &self.username.as_deref())
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("domain", &self.domain)
            .finish()
    }
}

impl StaticUserAuthenticator {
    pub fn new(
        domain: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Self {
        Self {
            username: username.map(|u| Zeroizing::new(u.to_string())),
            password: password.map(|p| Zeroizing::new(p.to_string())),
            domain: domain.map(str::to_string),
        }
    }
}

impl UserAuthenticator for StaticUserAuthenticator {
    fn request_authentication(&self, kinds: &[AuthDataKind]) -> Option<UserAuthenticationData> {
        let mut data = UserAuthenticationData::new();
        for kind in kinds {
            let value = match kind {
                AuthDataKind::Username => self.username.as_deref().map(String::as_str),
                AuthDataKind::Password => self.password.as_deref().map(String::as_str),
                AuthDataKind::Domain => self.domain.as_deref(),
            };
            if let Some(value) = value {
                data.set(*kind, value);
            }
        }
        Some(data)
    }
}

/// Merge authenticator data, embedded credentials and configured defaults
///
/// Each piece is resolved independently: authenticator value, then the value
/// embedded in the name, then (for the domain) the configured default, then
/// empty. The authenticator's data is always handed back for cleanup.
pub fn resolve_credentials(
    authenticator: Option<&dyn UserAuthenticator>,
    embedded: &EmbeddedCredentials,
    config: &SmbVfsConfig,
) -> AuthenticationContext {
    let data = authenticator.and_then(|a| a.request_authentication(&AuthDataKind::ALL));

    let pick = |kind: AuthDataKind, fallback: Option<&str>| -> String {
        data.as_ref()
            .and_then(|d| d.get(kind))
            .or(fallback)
            .unwrap_or("")
            .to_string()
    };

    let username = pick(AuthDataKind::Username, embedded.username.as_deref());
    let password = Zeroizing::new(pick(
        AuthDataKind::Password,
        embedded.password.as_deref().map(String::as_str),
    ));
    let domain = match pick(AuthDataKind::Domain, embedded.domain.as_deref()) {
        d if d.is_empty() => config.domain_fallback().to_string(),
        d => d,
    };

    if let (Some(authenticator), Some(data)) = (authenticator, data) {
        authenticator.cleanup(data);
    }

    AuthenticationContext::new(username, password.as_str(), domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAuthenticator {
        inner: StaticUserAuthenticator,
        cleanups: AtomicUsize,
    }

    impl UserAuthenticator for CountingAuthenticator {
        fn request_authentication(
            &self,
            kinds: &[AuthDataKind],
        ) -> Option<UserAuthenticationData> {
            self.inner.request_authentication(kinds)
        }

        fn cleanup(&self, mut data: UserAuthenticationData) {
            data.clear();
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn embedded(user: &str, pass: &str, domain: &str) -> EmbeddedCredentials {
        EmbeddedCredentials {
            username: Some(user.to_string()),
            password: Some(Zeroizing::new(pass.to_string())),
            domain: Some(domain.to_string()),
        }
    }

    #[test]
    fn test_authenticator_wins_per_piece() {
        let auth = StaticUserAuthenticator::new(None, Some("alice"), Some("pw1"));
        let ctx = resolve_credentials(
            Some(&auth),
            &embedded("bob", "pw2", "CORP"),
            &SmbVfsConfig::default(),
        );
        assert_eq!(ctx.username, "alice");
        assert_eq!(ctx.password.expose_secret(), "pw1");
        // Domain not supplied by the authenticator, taken from the name
        assert_eq!(ctx.domain, "CORP");
    }

    #[test]
    fn test_config_domain_fallback() {
        let config = SmbVfsConfig {
            default_domain: Some("WORKGROUP".to_string()),
            ..Default::default()
        };
        let ctx = resolve_credentials(None, &EmbeddedCredentials::default(), &config);
        assert!(ctx.is_anonymous());
        assert_eq!(ctx.domain, "WORKGROUP");
    }

    #[test]
    fn test_cleanup_always_called() {
        let auth = CountingAuthenticator {
            inner: StaticUserAuthenticator::new(Some("ACME"), None, None),
            cleanups: AtomicUsize::new(0),
        };
        let ctx = resolve_credentials(
            Some(&auth),
            &EmbeddedCredentials::default(),
            &SmbVfsConfig::default(),
        );
        assert_eq!(ctx.domain, "ACME");
        assert_eq!(auth.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = StaticUserAuthenticator::new(None, Some("alice"), Some("hunter2"));
        assert!(!format!("{:?}", auth).contains("hunter2"));

        let mut data = UserAuthenticationData::new();
        data.set(AuthDataKind::Password, "hunter2");
        assert!(!format!("{:?}", data).contains("hunter2"));
    }
}
