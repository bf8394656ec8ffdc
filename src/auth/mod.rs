//! Request authentication.
//!
//! [`AuthResolver`] decides, per inbound request, whether a caller is
//! authenticated and by which method, checking three tiers in order:
//! the server-side session, the remember-me cookie, and finally a
//! bearer/query API token. The first tier that matches wins; a success
//! on the cookie or token tiers promotes the identity into the session
//! and rotates the session ID.

pub mod credentials;
pub mod session;
pub mod store;

pub use credentials::Credentials;
pub use session::Session;
pub use store::{CredentialStore, SqliteCredentialStore};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;

use crate::db::User;

/// Hash a password (or remember-me token) using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a plaintext value against an Argon2 hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random opaque token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Faults the resolver can hit. "Not authenticated" is never an error;
/// these only cover the stores being unreachable, so the HTTP layer can
/// answer 5xx instead of 401.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credential store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::StoreUnavailable(err.into())
    }
}

/// How a request ended up authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Session,
    RememberToken,
    ApiToken,
}

/// The identity handed to request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthedUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for AuthedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Outcome of one resolution. `Unauthenticated` is a normal result, not
/// a fault.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authenticated { user: AuthedUser, method: AuthMethod },
    Unauthenticated,
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }
}

/// Per-request authentication chain over an injected credential store.
pub struct AuthResolver {
    store: Arc<dyn CredentialStore>,
    regeneration_interval: Duration,
}

impl AuthResolver {
    pub fn new(store: Arc<dyn CredentialStore>, regeneration_interval_secs: i64) -> Self {
        Self {
            store,
            regeneration_interval: Duration::seconds(regeneration_interval_secs),
        }
    }

    /// Resolve the caller's identity, first match wins.
    ///
    /// Session mutation only happens on success: the session tier
    /// rotates the ID when the regeneration interval has elapsed, the
    /// cookie and token tiers overwrite the full session identity and
    /// force a rotation.
    pub async fn resolve(
        &self,
        session: &mut Session,
        creds: &Credentials,
    ) -> Result<AuthOutcome, AuthError> {
        let now = Utc::now();

        // Tier 1: live session
        if session.is_authenticated() {
            session.rotate_if_due(self.regeneration_interval, now);
            let user = session.identity();
            return Ok(AuthOutcome::Authenticated {
                user,
                method: AuthMethod::Session,
            });
        }

        // Tier 2: remember-me cookie
        if let Some(cookie) = creds.remember_token.as_deref() {
            if let Some(user) = self.remember_token_user(cookie).await? {
                session.sign_in(&user, now);
                return Ok(AuthOutcome::Authenticated {
                    user: AuthedUser::from(&user),
                    method: AuthMethod::RememberToken,
                });
            }
        }

        // Tier 3: bearer header, falling back to the query parameter
        if let Some(token) = creds.api_token() {
            if let Some(user) = self.api_token_user(token).await? {
                session.sign_in(&user, now);
                return Ok(AuthOutcome::Authenticated {
                    user: AuthedUser::from(&user),
                    method: AuthMethod::ApiToken,
                });
            }
        }

        Ok(AuthOutcome::Unauthenticated)
    }

    /// Read-only probe over the same three tiers. Never touches the
    /// session, never rotates its ID.
    pub async fn check(&self, session: &Session, creds: &Credentials) -> Result<bool, AuthError> {
        if session.is_authenticated() {
            return Ok(true);
        }
        if let Some(cookie) = creds.remember_token.as_deref() {
            if self.remember_token_user(cookie).await?.is_some() {
                return Ok(true);
            }
        }
        if let Some(token) = creds.api_token() {
            if self.api_token_user(token).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Test the plaintext cookie against each non-expired remember-token
    /// row in store order, stopping at the first hash match. A match
    /// whose user row is gone yields `None` so the chain can continue.
    async fn remember_token_user(&self, cookie: &str) -> Result<Option<User>, AuthError> {
        let now = Utc::now();
        for row in self.store.remember_tokens(now).await? {
            if self.store.verify_token(cookie, &row.token_hash) {
                return self.store.user_by_id(&row.user_id).await;
            }
        }
        Ok(None)
    }

    async fn api_token_user(&self, token: &str) -> Result<Option<User>, AuthError> {
        let now = Utc::now();
        match self.store.api_token(token, now).await? {
            Some(row) => self.store.user_by_id(&row.user_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ApiTokenRow, RememberTokenRow};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;

    /// In-memory credential store. "Hashes" are the plaintext prefixed
    /// with `h:` so verification stays one-way-shaped without argon2.
    #[derive(Default)]
    struct MockStore {
        remember: Vec<(String, String, DateTime<Utc>)>, // user_id, token_hash, expires_at
        api: Vec<(String, String, DateTime<Utc>)>,      // token, user_id, expires_at
        users: HashMap<String, User>,
        fail: bool,
    }

    fn mock_hash(plaintext: &str) -> String {
        format!("h:{plaintext}")
    }

    #[async_trait]
    impl CredentialStore for MockStore {
        async fn remember_tokens(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<RememberTokenRow>, AuthError> {
            if self.fail {
                return Err(AuthError::StoreUnavailable(anyhow::anyhow!(
                    "connection refused"
                )));
            }
            Ok(self
                .remember
                .iter()
                .filter(|(_, _, expires)| *expires > now)
                .map(|(user_id, token_hash, _)| RememberTokenRow {
                    user_id: user_id.clone(),
                    token_hash: token_hash.clone(),
                })
                .collect())
        }

        async fn api_token(
            &self,
            token: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<ApiTokenRow>, AuthError> {
            if self.fail {
                return Err(AuthError::StoreUnavailable(anyhow::anyhow!(
                    "connection refused"
                )));
            }
            Ok(self
                .api
                .iter()
                .find(|(t, _, expires)| t == token && *expires > now)
                .map(|(_, user_id, _)| ApiTokenRow {
                    user_id: user_id.clone(),
                }))
        }

        async fn user_by_id(&self, id: &str) -> Result<Option<User>, AuthError> {
            if self.fail {
                return Err(AuthError::StoreUnavailable(anyhow::anyhow!(
                    "connection refused"
                )));
            }
            Ok(self.users.get(id).cloned())
        }

        fn verify_token(&self, plaintext: &str, token_hash: &str) -> bool {
            token_hash == mock_hash(plaintext)
        }
    }

    fn user(id: &str, name: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            password_hash: String::new(),
            name: name.to_string(),
            profile_pic: None,
            created_at: Utc::now().to_rfc3339(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    fn future() -> DateTime<Utc> {
        Utc::now() + Duration::days(7)
    }

    fn past() -> DateTime<Utc> {
        Utc::now() - Duration::days(7)
    }

    fn resolver(store: MockStore) -> AuthResolver {
        AuthResolver::new(Arc::new(store), 1800)
    }

    fn creds() -> Credentials {
        Credentials {
            remember_token: None,
            bearer_token: None,
            query_token: None,
        }
    }

    #[tokio::test]
    async fn session_tier_wins_over_everything_else() {
        let mut store = MockStore::default();
        store.users.insert("2".into(), user("2", "Bea", "b@x.com"));
        store
            .remember
            .push(("2".into(), mock_hash("cookie-value"), future()));
        store.api.push(("tok".into(), "2".into(), future()));
        let resolver = resolver(store);

        let mut session = Session::new();
        session.sign_in(&user("1", "Ana", "a@x.com"), Utc::now());
        let id_before = session.id().to_string();

        let creds = Credentials {
            remember_token: Some("cookie-value".into()),
            bearer_token: Some("tok".into()),
            query_token: None,
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        match outcome {
            AuthOutcome::Authenticated { user, method } => {
                assert_eq!(method, AuthMethod::Session);
                assert_eq!(user.id, "1");
                assert_eq!(user.name, "Ana");
            }
            other => panic!("expected session auth, got {other:?}"),
        }
        // last_regeneration is fresh, so no extra rotation happened
        assert_eq!(session.id(), id_before);
    }

    #[tokio::test]
    async fn session_identity_falls_back_to_placeholders() {
        let resolver = resolver(MockStore::default());
        let mut session = Session::new();
        session.set_user_id_for_test("9");

        let outcome = resolver.resolve(&mut session, &creds()).await.unwrap();
        match outcome {
            AuthOutcome::Authenticated { user, method } => {
                assert_eq!(method, AuthMethod::Session);
                assert_eq!(user.id, "9");
                assert_eq!(user.name, "User");
                assert_eq!(user.email, "");
            }
            other => panic!("expected session auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_session_rotates_its_id() {
        let resolver = resolver(MockStore::default());
        let mut session = Session::new();
        session.sign_in(&user("1", "Ana", "a@x.com"), Utc::now() - Duration::hours(2));
        let id_before = session.id().to_string();

        let outcome = resolver.resolve(&mut session, &creds()).await.unwrap();
        assert!(outcome.is_authenticated());
        assert_ne!(session.id(), id_before);
        assert!(session.is_dirty());
    }

    #[tokio::test]
    async fn remember_token_promotes_identity_into_session() {
        let mut store = MockStore::default();
        store.users.insert("5".into(), user("5", "Eve", "e@x.com"));
        store
            .remember
            .push(("5".into(), mock_hash("long-lived"), future()));
        let resolver = resolver(store);

        let mut session = Session::new();
        let id_before = session.id().to_string();
        let creds = Credentials {
            remember_token: Some("long-lived".into()),
            bearer_token: None,
            query_token: None,
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        match outcome {
            AuthOutcome::Authenticated { user, method } => {
                assert_eq!(method, AuthMethod::RememberToken);
                assert_eq!(user.id, "5");
            }
            other => panic!("expected remember-token auth, got {other:?}"),
        }
        assert!(session.is_authenticated());
        assert_eq!(session.user_name(), Some("Eve"));
        assert_eq!(session.user_email(), Some("e@x.com"));
        assert!(session.login_time().is_some());
        // promotion always rotates, regardless of the interval
        assert_ne!(session.id(), id_before);
    }

    #[tokio::test]
    async fn expired_remember_token_never_matches() {
        let mut store = MockStore::default();
        store.users.insert("5".into(), user("5", "Eve", "e@x.com"));
        store
            .remember
            .push(("5".into(), mock_hash("long-lived"), past()));
        let resolver = resolver(store);

        let mut session = Session::new();
        let creds = Credentials {
            remember_token: Some("long-lived".into()),
            bearer_token: None,
            query_token: None,
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn matched_token_with_missing_user_falls_through() {
        let mut store = MockStore::default();
        // remember token points at a deleted account, API token at a live one
        store
            .remember
            .push(("gone".into(), mock_hash("orphan"), future()));
        store.users.insert("7".into(), user("7", "Ana", "a@x.com"));
        store.api.push(("tok123".into(), "7".into(), future()));
        let resolver = resolver(store);

        let mut session = Session::new();
        let creds = Credentials {
            remember_token: Some("orphan".into()),
            bearer_token: Some("tok123".into()),
            query_token: None,
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        match outcome {
            AuthOutcome::Authenticated { user, method } => {
                assert_eq!(method, AuthMethod::ApiToken);
                assert_eq!(user.id, "7");
            }
            other => panic!("expected api-token auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bearer_token_authenticates_and_writes_session() {
        let mut store = MockStore::default();
        store.users.insert("7".into(), user("7", "Ana", "a@x.com"));
        store.api.push(("tok123".into(), "7".into(), future()));
        let resolver = resolver(store);

        let mut session = Session::new();
        let creds = Credentials {
            remember_token: None,
            bearer_token: Some("tok123".into()),
            query_token: None,
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Authenticated {
                user: AuthedUser {
                    id: "7".into(),
                    name: "Ana".into(),
                    email: "a@x.com".into(),
                },
                method: AuthMethod::ApiToken,
            }
        );
        assert!(session.is_authenticated());
        assert_eq!(session.user_id(), Some("7"));
    }

    #[tokio::test]
    async fn bearer_header_beats_query_parameter() {
        let mut store = MockStore::default();
        store.users.insert("1".into(), user("1", "Ana", "a@x.com"));
        store.users.insert("2".into(), user("2", "Bea", "b@x.com"));
        store.api.push(("header-tok".into(), "1".into(), future()));
        store.api.push(("query-tok".into(), "2".into(), future()));
        let resolver = resolver(store);

        let mut session = Session::new();
        let creds = Credentials {
            remember_token: None,
            bearer_token: Some("header-tok".into()),
            query_token: Some("query-tok".into()),
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        match outcome {
            AuthOutcome::Authenticated { user, .. } => assert_eq!(user.id, "1"),
            other => panic!("expected auth via header token, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_api_token_never_matches() {
        let mut store = MockStore::default();
        store.users.insert("7".into(), user("7", "Ana", "a@x.com"));
        store.api.push(("tok123".into(), "7".into(), past()));
        let resolver = resolver(store);

        let mut session = Session::new();
        let creds = Credentials {
            remember_token: None,
            bearer_token: Some("tok123".into()),
            query_token: None,
        };
        let outcome = resolver.resolve(&mut session, &creds).await.unwrap();
        assert_eq!(outcome, AuthOutcome::Unauthenticated);
    }

    #[tokio::test]
    async fn no_credentials_means_unauthenticated_without_mutation() {
        let resolver = resolver(MockStore::default());
        let mut session = Session::new();
        let id_before = session.id().to_string();

        let outcome = resolver.resolve(&mut session, &creds()).await.unwrap();
        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert!(!session.is_dirty());
        assert_eq!(session.id(), id_before);
    }

    #[tokio::test]
    async fn store_fault_is_not_unauthenticated() {
        let store = MockStore {
            fail: true,
            ..Default::default()
        };
        let resolver = resolver(store);

        let mut session = Session::new();
        let creds = Credentials {
            remember_token: Some("anything".into()),
            bearer_token: None,
            query_token: None,
        };
        let err = resolver.resolve(&mut session, &creds).await.unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn check_probe_never_mutates_the_session() {
        let mut store = MockStore::default();
        store.users.insert("7".into(), user("7", "Ana", "a@x.com"));
        store.api.push(("tok123".into(), "7".into(), future()));
        let resolver = resolver(store);

        let session = Session::new();
        let id_before = session.id().to_string();
        let creds = Credentials {
            remember_token: None,
            bearer_token: Some("tok123".into()),
            query_token: None,
        };
        assert!(resolver.check(&session, &creds).await.unwrap());
        assert!(!session.is_authenticated());
        assert!(!session.is_dirty());
        assert_eq!(session.id(), id_before);
    }

    #[tokio::test]
    async fn check_probe_is_read_only_on_the_remember_tier() {
        let mut store = MockStore::default();
        store.users.insert("5".into(), user("5", "Eve", "e@x.com"));
        store
            .remember
            .push(("5".into(), mock_hash("long-lived"), future()));
        let resolver = resolver(store);

        let session = Session::new();
        let id_before = session.id().to_string();
        let creds = Credentials {
            remember_token: Some("long-lived".into()),
            bearer_token: None,
            query_token: None,
        };
        assert!(resolver.check(&session, &creds).await.unwrap());
        assert!(!session.is_authenticated());
        assert!(!session.is_dirty());
        assert_eq!(session.id(), id_before);
    }

    #[tokio::test]
    async fn check_probe_reports_false_without_credentials() {
        let resolver = resolver(MockStore::default());
        let session = Session::new();
        assert!(!resolver.check(&session, &creds()).await.unwrap());
    }

    #[test]
    fn password_hashing_round_trip() {
        let hash = hash_password("hunter2-but-longer").unwrap();
        assert!(verify_password("hunter2-but-longer", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("hunter2-but-longer", "not-a-hash"));
    }

    #[test]
    fn generated_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
