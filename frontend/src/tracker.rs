//! # Finance tracker context
//!
//! One [`ApiClient`], one [`AuthState`] and one [`DataState`], created together
//! and shared by reference. The context owns the rules that span both states:
//! load data when a session begins, drop it when the session ends.

use shared::{CategoryTotal, FinanceOverview, MonthlySummary, Session};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::services::api::ApiClient;
use crate::state::{AuthState, DataState};

pub struct FinanceTracker {
    api: Arc<ApiClient>,
    auth: Arc<AuthState>,
    data: Arc<DataState>,
}

impl FinanceTracker {
    pub fn new(api: Arc<ApiClient>) -> Self {
        let auth = Arc::new(AuthState::new(api.clone()));
        let data = Arc::new(DataState::new(api.clone(), auth.clone()));
        Self { api, auth, data }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn auth(&self) -> &Arc<AuthState> {
        &self.auth
    }

    pub fn data(&self) -> &Arc<DataState> {
        &self.data
    }

    /// Restore a stored session and, if it holds, load the user's data
    pub async fn start(&self) -> Result<Session> {
        let session = self.auth.restore().await?;
        if session.authenticated {
            self.load_data().await;
        }
        Ok(session)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let was_authenticated = self.auth.is_authenticated();
        let session = self.auth.login(email, password).await?;
        if !was_authenticated && session.authenticated {
            self.load_data().await;
        }
        Ok(session)
    }

    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<Session> {
        let was_authenticated = self.auth.is_authenticated();
        let session = self.auth.register(email, password, full_name).await?;
        if !was_authenticated && session.authenticated {
            self.load_data().await;
        }
        Ok(session)
    }

    pub fn logout(&self) {
        self.auth.logout();
        self.data.clear();
    }

    /// Initial load for a new session; the failure stays on the data state
    async fn load_data(&self) {
        info!("Session started, loading data");
        if let Err(e) = self.data.refresh().await {
            warn!("Initial data load failed: {}", e);
        }
    }

    pub fn monthly_summary(&self) -> MonthlySummary {
        let snapshot = self.data.snapshot();
        shared::monthly_summary(&snapshot.expenses, &snapshot.incomes)
    }

    pub fn category_totals(&self) -> Vec<CategoryTotal> {
        shared::category_totals(&self.data.expenses())
    }

    pub fn overview(&self) -> FinanceOverview {
        let snapshot = self.data.snapshot();
        shared::overview(&snapshot.expenses, &snapshot.incomes)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl FinanceTracker {
    /// Native client persisting its credential where `config` says
    pub fn from_config(
        config: &crate::config::ClientConfig,
        transport: Arc<dyn crate::services::transport::Transport>,
    ) -> Result<Self> {
        let credentials = crate::services::credentials::FileCredentialStore::new(config.credential_path()?);
        info!(
            "Using {} with credential file {}",
            config.api_url,
            credentials.path().display()
        );
        let api = ApiClient::new(config.api_url.clone(), transport, Arc::new(credentials));
        Ok(Self::new(Arc::new(api)))
    }
}

#[cfg(target_arch = "wasm32")]
impl FinanceTracker {
    /// Browser client using fetch and local storage
    pub fn for_browser(api_url: &str) -> Self {
        use crate::services::credentials::LocalStorageCredentialStore;
        use crate::services::transport::BrowserTransport;

        let api = ApiClient::new(
            api_url,
            Arc::new(BrowserTransport),
            Arc::new(LocalStorageCredentialStore::default()),
        );
        Self::new(Arc::new(api))
    }
}
