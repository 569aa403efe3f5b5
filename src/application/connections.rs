use crate::domain::models::{CalendarConnection, Provider, connection_id};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::manual_token::decode_manual_token;
use crate::infrastructure::provider_auth::{
    AuthCredential, InteractiveAuthResult, ProviderAuthAdapter,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Implicit-grant tokens carry no per-token lifetime on this path, so a
/// fixed one-hour window is assumed and refreshed on re-auth.
const ASSUMED_TOKEN_LIFETIME_SECONDS: i64 = 3600;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Sign-in completed and the connection is stored.
    Connected(CalendarConnection),
    /// The popup was blocked and a full-page redirect was started; the
    /// connection will materialize on the next initialize.
    RedirectPending,
    /// This shell cannot host any interactive flow; the external browser
    /// was opened and the user must paste a manual token.
    ManualTokenRequired,
}

/// Owns the set of connected calendar accounts: interactive sign-in,
/// manual-token completion, persistence, and the in-memory snapshot the
/// rest of the app reads.
pub struct CalendarConnectionManager<S, A>
where
    S: CredentialStore,
    A: ProviderAuthAdapter,
{
    store: Arc<S>,
    auth: Arc<A>,
    supports_embedded_popup: bool,
    now_provider: NowProvider,
    connections: Mutex<Vec<CalendarConnection>>,
    init: tokio::sync::Mutex<bool>,
}

impl<S, A> CalendarConnectionManager<S, A>
where
    S: CredentialStore,
    A: ProviderAuthAdapter,
{
    pub fn new(store: Arc<S>, auth: Arc<A>, supports_embedded_popup: bool) -> Self {
        Self {
            store,
            auth,
            supports_embedded_popup,
            now_provider: Arc::new(Utc::now),
            connections: Mutex::new(Vec::new()),
            init: tokio::sync::Mutex::new(false),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Startup sequence: drain at most one pending redirect completion,
    /// then load stored connections. Single-flight; a second call while
    /// one is in progress waits and then returns without repeating the
    /// work. A load failure degrades to an empty list and leaves the
    /// manager uninitialized so the next call retries. A failed redirect
    /// finalization does not block initialization but is returned so the
    /// caller can log it and re-prompt.
    pub async fn initialize(&self) -> Result<(), InfraError> {
        let mut done = self.init.lock().await;
        if *done {
            return Ok(());
        }

        // A redirect completion is consumed exactly once. Finalization
        // persists the connection, so the load below picks it up.
        let redirect_error = match self.auth.take_pending_redirect().await {
            Ok(Some(credential)) => self.finalize_credential(credential).err(),
            Ok(None) => None,
            Err(error) => Some(error),
        };

        match self.store.list() {
            Ok(stored) => {
                *self.lock_connections()? = stored;
                *done = true;
            }
            Err(_) => {
                self.lock_connections()?.clear();
            }
        }

        match redirect_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Interactive sign-in entry point. Popup first where the shell
    /// supports it, redirect fallback when the popup is blocked, external
    /// browser plus manual token everywhere else. A user-cancelled popup
    /// is surfaced as an error and stores nothing.
    pub async fn connect(&self, provider: Provider) -> Result<ConnectOutcome, InfraError> {
        if !self.supports_embedded_popup {
            self.auth.begin_external_sign_in(provider).await?;
            return Ok(ConnectOutcome::ManualTokenRequired);
        }

        match self.auth.sign_in_popup(provider).await {
            Ok(InteractiveAuthResult::Credential(credential)) => {
                let connection = self.finalize_credential(credential)?;
                Ok(ConnectOutcome::Connected(connection))
            }
            Ok(InteractiveAuthResult::RedirectStarted) => Ok(ConnectOutcome::RedirectPending),
            Err(InfraError::PopupBlocked) => {
                self.auth.begin_redirect_sign_in(provider).await?;
                Ok(ConnectOutcome::RedirectPending)
            }
            Err(other) => Err(other),
        }
    }

    /// Completes the external-browser flow from a pasted token. The token
    /// must decode and must be for the provider the user picked.
    pub fn process_manual_token(
        &self,
        provider: Provider,
        encoded: &str,
    ) -> Result<CalendarConnection, InfraError> {
        let payload = decode_manual_token(encoded)?;
        if payload.provider != provider {
            return Err(InfraError::InvalidManualToken(format!(
                "token is for {}, expected {}",
                payload.provider.as_str(),
                provider.as_str()
            )));
        }
        if payload.uid.trim().is_empty() || payload.email.trim().is_empty() {
            return Err(InfraError::InvalidManualToken(
                "token is missing the account identity".to_string(),
            ));
        }

        self.finalize_credential(AuthCredential {
            provider: payload.provider,
            email: payload.email,
            provider_user_id: payload.uid,
            access_token: payload.access_token,
            id_token: payload.id_token,
        })
    }

    /// Turns a completed sign-in into a stored connection. Prefers the
    /// access token, falls back to the id token, and fails when neither is
    /// present. Re-auth of an existing account overwrites the record but
    /// keeps its original connected_at.
    fn finalize_credential(
        &self,
        credential: AuthCredential,
    ) -> Result<CalendarConnection, InfraError> {
        let token = credential
            .access_token
            .as_deref()
            .or(credential.id_token.as_deref())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToOwned::to_owned)
            .ok_or(InfraError::TokenExtractionFailed)?;

        let now = (self.now_provider)();
        let id = connection_id(credential.provider, &credential.provider_user_id);

        let mut connections = self.lock_connections()?;
        let connected_at = connections
            .iter()
            .find(|existing| existing.id == id)
            .map(|existing| existing.connected_at)
            .unwrap_or(now);

        let connection = CalendarConnection {
            id: id.clone(),
            provider: credential.provider,
            email: credential.email,
            access_token: token,
            refresh_token: None,
            expires_at: now + Duration::seconds(ASSUMED_TOKEN_LIFETIME_SECONDS),
            connected_at,
        };
        connection
            .validate()
            .map_err(InfraError::InvalidManualToken)?;

        self.store.upsert(&connection)?;
        match connections.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = connection.clone(),
            None => connections.push(connection.clone()),
        }
        Ok(connection)
    }

    /// Replaces a connection after a token refresh. No-op when the
    /// connection was disconnected in the meantime.
    pub fn update_connection(&self, connection: &CalendarConnection) -> Result<(), InfraError> {
        let mut connections = self.lock_connections()?;
        let Some(existing) = connections
            .iter_mut()
            .find(|existing| existing.id == connection.id)
        else {
            return Ok(());
        };
        self.store.upsert(connection)?;
        *existing = connection.clone();
        Ok(())
    }

    /// Removes a connection everywhere. Idempotent; an unknown id is not
    /// an error.
    pub fn disconnect(&self, connection_id: &str) -> Result<(), InfraError> {
        self.store.remove(connection_id)?;
        let mut connections = self.lock_connections()?;
        connections.retain(|connection| connection.id != connection_id);
        Ok(())
    }

    pub fn list_connections(&self) -> Result<Vec<CalendarConnection>, InfraError> {
        Ok(self.lock_connections()?.clone())
    }

    fn lock_connections(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Vec<CalendarConnection>>, InfraError> {
        self.connections
            .lock()
            .map_err(|error| InfraError::Credential(format!("connection lock poisoned: {error}")))
    }
}
