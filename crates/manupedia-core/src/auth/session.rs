//! The session manager: single source of truth for who is logged in.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::access::{self, Access};
use crate::api::{ApiError, DynAuthApi};
use crate::models::{AuthResponse, Identity, LoginRequest, SignupRequest};

use super::error::{AuthFailure, LOGIN_FAILED, SIGNUP_FAILED};
use super::storage::{SessionStore, TOKEN_KEY, USER_KEY};

/// An authenticated session. Token and identity only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub identity: Identity,
}

/// Receiver side of session change notifications.
/// The current value is always the latest session (`None` when logged out).
pub type SessionWatch = watch::Receiver<Option<AuthSession>>;

/// Owns the authenticated identity and bearer token.
///
/// Construct one per running client, call [`SessionManager::initialize`]
/// once, and share it behind an `Arc`. Mutations persist to the
/// [`SessionStore`] and publish to every [`SessionWatch`] before returning.
pub struct SessionManager {
    api: DynAuthApi,
    store: Arc<dyn SessionStore>,
    state: watch::Sender<Option<AuthSession>>,
    // Held while persisting and publishing so both happen in the same order
    // for concurrent writers.
    write_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(api: DynAuthApi, store: Arc<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            api,
            store,
            state,
            write_lock: Mutex::new(()),
        }
    }

    /// Restore a persisted session. Returns true if one was adopted.
    ///
    /// Partial or invalid records are purged and leave the session empty.
    pub fn initialize(&self) -> bool {
        let _guard = self.write_lock.lock();
        match self.read_persisted() {
            Ok(Some(session)) => {
                info!(user_id = session.identity.id, "Restored persisted session");
                self.state.send_replace(Some(session));
                true
            }
            Ok(None) => {
                debug!("No persisted session");
                false
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed persisted session");
                self.write_locked(None);
                false
            }
        }
    }

    fn read_persisted(&self) -> Result<Option<AuthSession>> {
        let token = self.store.get(TOKEN_KEY).context("Failed to read persisted token")?;
        let user = self.store.get(USER_KEY).context("Failed to read persisted user")?;

        let (token, user) = match (token, user) {
            (None, None) => return Ok(None),
            (Some(token), Some(user)) => (token, user),
            (Some(_), None) => return Err(anyhow!("token persisted without user")),
            (None, Some(_)) => return Err(anyhow!("user persisted without token")),
        };
        if token.trim().is_empty() {
            return Err(anyhow!("persisted token is empty"));
        }
        let identity = Identity::from_json(&user)?;
        Ok(Some(AuthSession { token, identity }))
    }

    /// Authenticate with email and password.
    ///
    /// On failure the current session is left exactly as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthFailure> {
        let request = LoginRequest { email, password };
        let result = self.api.login(&request).await;
        self.complete_auth(result, LOGIN_FAILED)
    }

    /// Create an account and log into it.
    pub async fn signup(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
        phone: &str,
    ) -> Result<Identity, AuthFailure> {
        let request = SignupRequest {
            name: display_name,
            email,
            password,
            phone,
        };
        let result = self.api.signup(&request).await;
        self.complete_auth(result, SIGNUP_FAILED)
    }

    fn complete_auth(
        &self,
        result: Result<AuthResponse, ApiError>,
        fallback: &str,
    ) -> Result<Identity, AuthFailure> {
        let response = result.map_err(|e| {
            warn!(error = %e, "{}", fallback);
            AuthFailure::new(e, fallback)
        })?;
        let (token, identity) = response.into_parts().map_err(|e| {
            warn!(error = %e, "{}: malformed response", fallback);
            AuthFailure::new(e, fallback)
        })?;

        info!(user_id = identity.id, role = %identity.role, "Session established");
        self.write(Some(AuthSession {
            token,
            identity: identity.clone(),
        }));
        Ok(identity)
    }

    /// Forget the session locally and in storage. No network traffic.
    pub fn logout(&self) {
        info!("Logging out");
        self.write(None);
    }

    /// React to an auth-rejection for `rejected_token`.
    ///
    /// Logs out when that token is still the current one. A rejection for a
    /// token already replaced by a newer login is ignored. Returns true if
    /// the session was cleared.
    pub fn invalidate(&self, rejected_token: &str) -> bool {
        let _guard = self.write_lock.lock();
        let is_current = self
            .state
            .borrow()
            .as_ref()
            .map_or(false, |s| s.token == rejected_token);
        if !is_current {
            debug!("Ignoring rejection of a token that is no longer current");
            return false;
        }
        warn!("Backend rejected the session token, logging out");
        self.write_locked(None);
        true
    }

    fn write(&self, next: Option<AuthSession>) {
        let _guard = self.write_lock.lock();
        self.write_locked(next);
    }

    /// Persist then publish. Caller holds `write_lock`.
    fn write_locked(&self, next: Option<AuthSession>) {
        if let Err(e) = self.persist(next.as_ref()) {
            warn!(error = %e, "Failed to persist session");
        }
        self.state.send_replace(next);
    }

    fn persist(&self, session: Option<&AuthSession>) -> Result<()> {
        match session {
            Some(session) => {
                let user = serde_json::to_string(&session.identity)?;
                self.store.apply(&[
                    (TOKEN_KEY, Some(session.token.as_str())),
                    (USER_KEY, Some(user.as_str())),
                ])
            }
            None => self.store.apply(&[(TOKEN_KEY, None), (USER_KEY, None)]),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .borrow()
            .as_ref()
            .map_or(false, |s| s.identity.is_admin())
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().as_ref().map(|s| s.identity.clone())
    }

    /// Current bearer token, for attaching to outgoing requests.
    pub fn token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn snapshot(&self) -> Option<AuthSession> {
        self.state.borrow().as_ref().cloned()
    }

    pub fn subscribe(&self) -> SessionWatch {
        self.state.subscribe()
    }

    pub fn permits(&self, access: Access) -> bool {
        access.permits(self.state.borrow().as_ref())
    }

    pub fn can_modify(&self, owner_email: Option<&str>) -> bool {
        access::can_modify(self.state.borrow().as_ref(), owner_email)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use super::*;
    use crate::api::AuthApi;
    use crate::auth::storage::MemoryStore;
    use crate::models::Role;

    type Reply = Result<AuthResponse, ApiError>;

    /// Answers auth calls from a queue, recording what was sent.
    #[derive(Default)]
    struct ScriptedApi {
        replies: parking_lot::Mutex<VecDeque<Reply>>,
        gates: parking_lot::Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
        signups: parking_lot::Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedApi {
        fn with_replies(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: parking_lot::Mutex::new(replies.into()),
                ..Default::default()
            })
        }

        /// Make the next login for `email` wait until the returned sender fires.
        fn gate(&self, email: &str) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(email.to_string(), rx);
            tx
        }

        async fn next(&self, email: &str) -> Reply {
            let gate = self.gates.lock().remove(email);
            match gate {
                Some(rx) => rx.await.expect("gate sender dropped"),
                None => self
                    .replies
                    .lock()
                    .pop_front()
                    .expect("no scripted reply left"),
            }
        }
    }

    #[async_trait]
    impl AuthApi for ScriptedApi {
        async fn login(&self, request: &LoginRequest<'_>) -> Reply {
            self.next(request.email).await
        }

        async fn signup(&self, request: &SignupRequest<'_>) -> Reply {
            self.signups.lock().push((
                request.name.to_string(),
                request.email.to_string(),
                request.phone.to_string(),
            ));
            self.next(request.email).await
        }
    }

    fn reply(token: &str, id: i64, email: &str, name: &str, role: Role) -> Reply {
        Ok(AuthResponse {
            token: token.to_string(),
            id,
            email: email.to_string(),
            name: name.to_string(),
            role,
        })
    }

    fn rejected(status: u16, message: Option<&str>) -> Reply {
        let message = message.map(str::to_string);
        Err(match status {
            401 => ApiError::Unauthorized { message },
            _ => ApiError::BadRequest { status, message },
        })
    }

    fn manager(api: Arc<ScriptedApi>, store: Arc<MemoryStore>) -> SessionManager {
        SessionManager::new(api, store)
    }

    fn persist_raw(store: &MemoryStore, token: Option<&str>, user: Option<&str>) {
        if let Some(token) = token {
            store.set(TOKEN_KEY, token).unwrap();
        }
        if let Some(user) = user {
            store.set(USER_KEY, user).unwrap();
        }
    }

    // -------------------------------------------------------------------------
    // Restoration
    // -------------------------------------------------------------------------

    #[test]
    fn test_initialize_restores_valid_session() {
        let store = Arc::new(MemoryStore::new());
        persist_raw(
            &store,
            Some("t1"),
            Some(r#"{"id":1,"email":"a@x.com","name":"A","role":"ADMIN"}"#),
        );
        let session = manager(ScriptedApi::with_replies(vec![]), store.clone());

        assert!(session.initialize());
        assert!(session.is_authenticated());
        assert!(session.is_admin());
        assert_eq!(session.token().as_deref(), Some("t1"));
        assert_eq!(
            session.identity(),
            Some(Identity {
                id: 1,
                email: "a@x.com".to_string(),
                display_name: "A".to_string(),
                role: Role::Admin,
            })
        );
        // Restoring does not rewrite storage
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("t1"));
    }

    #[test]
    fn test_initialize_with_nothing_persisted() {
        let store = Arc::new(MemoryStore::new());
        let session = manager(ScriptedApi::with_replies(vec![]), store.clone());

        assert!(!session.initialize());
        assert!(!session.is_authenticated());
        assert!(!session.is_admin());
        assert!(store.is_empty());
    }

    #[test]
    fn test_initialize_purges_malformed_records() {
        let valid_user = r#"{"id":1,"email":"a@x.com","name":"A","role":"USER"}"#;
        let cases: Vec<(Option<&str>, Option<&str>)> = vec![
            // Missing identity
            (Some("t1"), None),
            // Missing token
            (None, Some(valid_user)),
            // Empty token
            (Some(""), Some(valid_user)),
            // Identity missing a field
            (Some("t1"), Some(r#"{"id":1,"email":"a@x.com","role":"USER"}"#)),
            // Empty display name
            (Some("t1"), Some(r#"{"id":1,"email":"a@x.com","name":"","role":"USER"}"#)),
            // Role outside USER/ADMIN
            (Some("t1"), Some(r#"{"id":1,"email":"a@x.com","name":"A","role":"OWNER"}"#)),
            // Not JSON at all
            (Some("t1"), Some("[object Object]")),
        ];

        for (token, user) in cases {
            let store = Arc::new(MemoryStore::new());
            persist_raw(&store, token, user);
            let session = manager(ScriptedApi::with_replies(vec![]), store.clone());

            assert!(!session.initialize(), "restored {:?} / {:?}", token, user);
            assert!(!session.is_authenticated());
            assert!(store.get(TOKEN_KEY).unwrap().is_none());
            assert!(store.get(USER_KEY).unwrap().is_none());
        }
    }

    // -------------------------------------------------------------------------
    // Login / signup
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_establishes_and_persists_session() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::with_replies(vec![reply("t1", 1, "a@x.com", "A", Role::User)]);
        let session = manager(api, store.clone());
        session.initialize();

        let identity = session.login("a@x.com", "pw").await.unwrap();
        assert_eq!(identity.display_name, "A");
        assert!(session.is_authenticated());
        assert!(!session.is_admin());
        assert_eq!(session.token().as_deref(), Some("t1"));

        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("t1"));
        let persisted: serde_json::Value =
            serde_json::from_str(&store.get(USER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(
            persisted,
            serde_json::json!({"id": 1, "email": "a@x.com", "name": "A", "role": "USER"})
        );
    }

    #[tokio::test]
    async fn test_persisted_login_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::with_replies(vec![reply("t9", 9, "z@x.com", "Zed", Role::Admin)]);
        let first = manager(api, store.clone());
        let identity = first.login("z@x.com", "pw").await.unwrap();

        let second = manager(ScriptedApi::with_replies(vec![]), store);
        assert!(second.initialize());
        assert_eq!(second.identity(), Some(identity));
        assert_eq!(second.token().as_deref(), Some("t9"));
        assert!(second.is_admin());
    }

    #[tokio::test]
    async fn test_failed_login_leaves_existing_session_untouched() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::with_replies(vec![
            reply("t1", 1, "a@x.com", "A", Role::User),
            rejected(401, Some("Invalid email or password")),
        ]);
        let session = manager(api, store.clone());
        session.login("a@x.com", "pw").await.unwrap();

        let before = session.snapshot();
        let stored_token = store.get(TOKEN_KEY).unwrap();
        let stored_user = store.get(USER_KEY).unwrap();

        let err = session.login("a@x.com", "wrong").await.unwrap_err();
        assert_eq!(err.message(), "Invalid email or password");

        assert_eq!(session.snapshot(), before);
        assert_eq!(store.get(TOKEN_KEY).unwrap(), stored_token);
        assert_eq!(store.get(USER_KEY).unwrap(), stored_user);
    }

    #[tokio::test]
    async fn test_login_failure_without_message_uses_fallback() {
        let api = ScriptedApi::with_replies(vec![rejected(400, None)]);
        let session = manager(api, Arc::new(MemoryStore::new()));

        let err = session.login("a@x.com", "pw").await.unwrap_err();
        assert_eq!(err.message(), "Login failed");
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_network_error_uses_fallback() {
        let network_error = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let api = ScriptedApi::with_replies(vec![Err(ApiError::NetworkError(network_error))]);
        let session = manager(api, Arc::new(MemoryStore::new()));

        let err = session.login("a@x.com", "pw").await.unwrap_err();
        assert_eq!(err.message(), "Login failed");
        assert!(err.is_network());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_malformed_response_is_a_failure() {
        let api = ScriptedApi::with_replies(vec![reply("t1", 1, "a@x.com", "", Role::User)]);
        let store = Arc::new(MemoryStore::new());
        let session = manager(api, store.clone());

        let err = session.login("a@x.com", "pw").await.unwrap_err();
        assert_eq!(err.message(), "Login failed");
        assert!(!session.is_authenticated());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_signup_failure_surfaces_backend_message() {
        let api = ScriptedApi::with_replies(vec![rejected(400, Some("Email taken"))]);
        let store = Arc::new(MemoryStore::new());
        let session = manager(api.clone(), store.clone());
        session.initialize();

        let err = session
            .signup("A", "a@x.com", "Password1", "5551234567")
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Email taken");
        assert!(!session.is_authenticated());
        assert!(store.is_empty());

        let signups = api.signups.lock();
        assert_eq!(
            signups.as_slice(),
            &[(
                "A".to_string(),
                "a@x.com".to_string(),
                "5551234567".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_signup_success_logs_in() {
        let api = ScriptedApi::with_replies(vec![reply("s1", 5, "n@x.com", "New", Role::User)]);
        let session = manager(api, Arc::new(MemoryStore::new()));

        let identity = session
            .signup("New", "n@x.com", "Password1", "5551234567")
            .await
            .unwrap();
        assert_eq!(identity.id, 5);
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_signup_failure_without_message_uses_fallback() {
        let api = ScriptedApi::with_replies(vec![rejected(500, None)]);
        let session = manager(api, Arc::new(MemoryStore::new()));

        let err = session.signup("A", "a@x.com", "pw", "").await.unwrap_err();
        assert_eq!(err.message(), "Signup failed");
    }

    // -------------------------------------------------------------------------
    // Logout and invalidation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::with_replies(vec![reply("t1", 1, "a@x.com", "A", Role::Admin)]);
        let session = manager(api, store.clone());
        session.login("a@x.com", "pw").await.unwrap();
        assert!(session.is_admin());

        session.logout();
        assert!(!session.is_authenticated());
        assert!(!session.is_admin());
        assert_eq!(session.identity(), None);
        assert_eq!(session.token(), None);
        assert!(store.is_empty());

        // Logging out twice is harmless
        session.logout();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_auth_rejection_logs_out() {
        let store = Arc::new(MemoryStore::new());
        let api = ScriptedApi::with_replies(vec![reply("t1", 1, "a@x.com", "A", Role::User)]);
        let session = manager(api, store.clone());
        session.login("a@x.com", "pw").await.unwrap();

        assert!(session.invalidate("t1"));
        assert!(!session.is_authenticated());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_of_replaced_token_is_ignored() {
        let api = ScriptedApi::with_replies(vec![
            reply("old", 1, "a@x.com", "A", Role::User),
            reply("new", 1, "a@x.com", "A", Role::User),
        ]);
        let session = manager(api, Arc::new(MemoryStore::new()));
        session.login("a@x.com", "pw").await.unwrap();
        session.login("a@x.com", "pw").await.unwrap();

        assert!(!session.invalidate("old"));
        assert_eq!(session.token().as_deref(), Some("new"));

        // Nothing to invalidate once logged out
        session.logout();
        assert!(!session.invalidate("new"));
    }

    // -------------------------------------------------------------------------
    // Notification and ordering
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_subscribers_see_every_change() {
        let api = ScriptedApi::with_replies(vec![reply("t1", 1, "a@x.com", "A", Role::User)]);
        let session = manager(api, Arc::new(MemoryStore::new()));
        let mut watch = session.subscribe();
        assert!(watch.borrow_and_update().is_none());

        session.login("a@x.com", "pw").await.unwrap();
        assert!(watch.has_changed().unwrap());
        assert_eq!(
            watch.borrow_and_update().as_ref().map(|s| s.token.clone()),
            Some("t1".to_string())
        );

        session.logout();
        watch.changed().await.unwrap();
        assert!(watch.borrow().is_none());
    }

    #[tokio::test]
    async fn test_pending_login_does_not_change_state() {
        let api = Arc::new(ScriptedApi::default());
        let gate = api.gate("a@x.com");
        let session = manager(api, Arc::new(MemoryStore::new()));

        let mut pending = Box::pin(session.login("a@x.com", "pw"));
        assert!(futures::poll!(&mut pending).is_pending());
        assert!(!session.is_authenticated());

        gate.send(reply("t1", 1, "a@x.com", "A", Role::User)).unwrap();
        pending.await.unwrap();
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_last_applied_login_wins() {
        let api = Arc::new(ScriptedApi::default());
        let gate_a = api.gate("a@x.com");
        let gate_b = api.gate("b@x.com");
        let store = Arc::new(MemoryStore::new());
        let session = manager(api, store.clone());

        let driver = async {
            // b resolves first, a resolves last
            gate_b
                .send(reply("tb", 2, "b@x.com", "B", Role::Admin))
                .unwrap();
            tokio::task::yield_now().await;
            gate_a
                .send(reply("ta", 1, "a@x.com", "A", Role::User))
                .unwrap();
        };

        let (a, b, ()) = futures::join!(
            session.login("a@x.com", "pw"),
            session.login("b@x.com", "pw"),
            driver
        );
        a.unwrap();
        b.unwrap();

        let current = session.snapshot().unwrap();
        assert_eq!(current.token, "ta");
        assert_eq!(current.identity.email, "a@x.com");
        assert!(!session.is_admin());

        // Storage agrees with memory, no mixing of the two responses
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("ta"));
        let persisted = Identity::from_json(&store.get(USER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted, current.identity);
    }

    #[tokio::test]
    async fn test_gating_follows_session() {
        let api = ScriptedApi::with_replies(vec![reply("t1", 1, "a@x.com", "A", Role::User)]);
        let session = manager(api, Arc::new(MemoryStore::new()));

        assert!(session.permits(Access::Public));
        assert!(!session.permits(Access::Authenticated));
        assert!(!session.can_modify(Some("a@x.com")));

        session.login("a@x.com", "pw").await.unwrap();
        assert!(session.permits(Access::Authenticated));
        assert!(!session.permits(Access::Admin));
        assert!(session.can_modify(Some("a@x.com")));
        assert!(!session.can_modify(Some("b@x.com")));
    }
}
