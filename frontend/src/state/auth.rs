//! # Auth State
//!
//! Holds the session (authenticated flag + user profile). The bearer token
//! itself lives in the [`ApiClient`]; this state decides when it is set or
//! cleared. Session changes are broadcast on a watch channel.

use shared::{LoginForm, RegisterRequest, Session, TokenResponse, User};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ClientError, Result};
use crate::lock;
use crate::services::api::ApiClient;

const TOKEN_PATH: &str = "/auth/token";
const REGISTER_PATH: &str = "/auth/register";
const PROFILE_PATH: &str = "/auth/me";

pub struct AuthState {
    api: Arc<ApiClient>,
    session: Mutex<Session>,
    /// Bumped whenever a credential is issued or dropped
    epoch: AtomicU64,
    changes: watch::Sender<Session>,
}

impl AuthState {
    /// A stored credential counts as authenticated until proven otherwise
    pub fn new(api: Arc<ApiClient>) -> Self {
        let session = Session {
            authenticated: api.has_credential(),
            user: None,
        };
        let (changes, _) = watch::channel(session.clone());

        Self {
            api,
            session: Mutex::new(session),
            epoch: AtomicU64::new(0),
            changes,
        }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn session(&self) -> Session {
        lock(&self.session).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.session).authenticated
    }

    pub fn user(&self) -> Option<User> {
        lock(&self.session).user.clone()
    }

    /// Identifies the current credential. Results of requests issued under an
    /// older epoch belong to a session that no longer exists.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn next_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Receive every session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.changes.subscribe()
    }

    fn set_session(&self, session: Session) {
        *lock(&self.session) = session.clone();
        self.changes.send_replace(session);
    }

    /// Exchange email and password for a token, then load the profile
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        info!("Attempting login for {}", email);

        let form = LoginForm {
            username: email.to_string(),
            password: password.to_string(),
        };
        let response: TokenResponse = self
            .api
            .post_form(TOKEN_PATH, &form)
            .await
            .map_err(|e| {
                warn!("Login failed: {}", e);
                e.into_auth()
            })?;

        let token = response.token().ok_or_else(|| {
            warn!("Login failed: no access token in response");
            ClientError::Auth {
                status: None,
                message: "No access token received".to_string(),
            }
        })?;

        self.api.set_credential(token)?;
        self.next_epoch();
        self.set_session(Session {
            authenticated: true,
            user: None,
        });

        match self.api.get::<User>(PROFILE_PATH).await {
            Ok(user) => {
                info!("Logged in as {} (id {})", user.email, user.id);
                let session = Session {
                    authenticated: true,
                    user: Some(user),
                };
                self.set_session(session.clone());
                Ok(session)
            }
            Err(e) => {
                // Don't leave a token behind that we could not confirm
                warn!("Failed to load profile after login: {}", e);
                self.logout();
                Err(e.into_auth())
            }
        }
    }

    /// Create the account, then log in with the same credentials
    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<Session> {
        info!("Attempting registration for {}", email);

        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        };
        let user: User = self
            .api
            .post(REGISTER_PATH, &request)
            .await
            .map_err(|e| {
                warn!("Registration failed: {}", e);
                e.into_auth()
            })?;

        info!("Registered user id {}, logging in", user.id);
        self.login(email, password).await
    }

    /// Drop the credential and the session. Never fails, safe to repeat.
    pub fn logout(&self) {
        if let Err(e) = self.api.clear_credential() {
            warn!("Failed to remove stored credential: {}", e);
        }
        self.next_epoch();
        if self.is_authenticated() {
            info!("Logged out");
        }
        self.set_session(Session::anonymous());
    }

    /// Re-establish a session from a stored credential.
    ///
    /// A 401 on the profile means the stored token is no longer valid and the
    /// session is logged out. Other failures keep the session authenticated
    /// without a profile.
    pub async fn restore(&self) -> Result<Session> {
        if !self.api.has_credential() {
            self.set_session(Session::anonymous());
            return Ok(self.session());
        }

        match self.api.get::<User>(PROFILE_PATH).await {
            Ok(user) => {
                info!("Restored session for {}", user.email);
                let session = Session {
                    authenticated: true,
                    user: Some(user),
                };
                self.set_session(session.clone());
                Ok(session)
            }
            Err(ClientError::Api { status: 401, .. }) => {
                info!("Stored credential was rejected, logging out");
                self.logout();
                Ok(self.session())
            }
            Err(e) => {
                warn!("Could not restore profile: {}", e);
                self.set_session(Session {
                    authenticated: true,
                    user: None,
                });
                Err(e)
            }
        }
    }
}
