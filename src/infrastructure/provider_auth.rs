use crate::domain::models::Provider;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use url::Url;

const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const MICROSOFT_AUTHORIZATION_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";

// Read-only delegated scopes. Events are imported, never written, so write
// access is never requested from either provider.
const GOOGLE_CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";
const MICROSOFT_CALENDAR_SCOPE: &str = "https://graph.microsoft.com/Calendars.Read";

pub fn calendar_scope(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => GOOGLE_CALENDAR_SCOPE,
        Provider::Microsoft => MICROSOFT_CALENDAR_SCOPE,
    }
}

/// Credential surfaced by a completed interactive sign-in, before it is
/// turned into a persisted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredential {
    pub provider: Provider,
    pub email: String,
    pub provider_user_id: String,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveAuthResult {
    /// The popup completed synchronously and produced a credential.
    Credential(AuthCredential),
    /// The flow was handed off to a full-page redirect; the credential will
    /// surface on a later `take_pending_redirect` call after reload.
    RedirectStarted,
}

/// Interactive OAuth seam, polymorphic over the two supported providers
/// only. Implementations decide how the consent page is hosted; the
/// connection manager decides which entry point to use.
#[async_trait]
pub trait ProviderAuthAdapter: Send + Sync {
    /// In-process popup sign-in. Fails with `PopupBlocked` when the host
    /// refuses the popup and `UserCancelled` when the user closes it.
    async fn sign_in_popup(&self, provider: Provider)
    -> Result<InteractiveAuthResult, InfraError>;

    /// Full-page redirect fallback after a blocked popup. Completion is
    /// observed by `take_pending_redirect` on the next app load.
    async fn begin_redirect_sign_in(&self, provider: Provider) -> Result<(), InfraError>;

    /// Restricted-shell path: open the provider consent flow in the user's
    /// external browser. The caller must later submit a manual token.
    async fn begin_external_sign_in(&self, provider: Provider) -> Result<(), InfraError>;

    /// Checked exactly once at startup. `None` means no redirect flow was
    /// pending, which is a normal empty result.
    async fn take_pending_redirect(&self) -> Result<Option<AuthCredential>, InfraError>;
}

/// Production adapter for desktop shells without an embeddable popup: the
/// consent page opens in the system browser and the result comes back as a
/// pasted manual token.
#[derive(Debug, Clone)]
pub struct ExternalBrowserAuthAdapter {
    client_id: String,
    redirect_uri: String,
}

impl ExternalBrowserAuthAdapter {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn consent_url(&self, provider: Provider) -> Result<String, InfraError> {
        let endpoint = match provider {
            Provider::Google => GOOGLE_AUTHORIZATION_ENDPOINT,
            Provider::Microsoft => MICROSOFT_AUTHORIZATION_ENDPOINT,
        };
        let mut url = Url::parse(endpoint).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid authorization endpoint: {error}"))
        })?;

        url.query_pairs_mut()
            .append_pair("response_type", "token")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", calendar_scope(provider))
            .append_pair("prompt", "consent");
        Ok(url.to_string())
    }
}

#[async_trait]
impl ProviderAuthAdapter for ExternalBrowserAuthAdapter {
    async fn sign_in_popup(
        &self,
        _provider: Provider,
    ) -> Result<InteractiveAuthResult, InfraError> {
        // No webview popup host in this shell.
        Err(InfraError::PopupBlocked)
    }

    async fn begin_redirect_sign_in(&self, provider: Provider) -> Result<(), InfraError> {
        // Without an in-process page to redirect, the external browser is
        // the closest equivalent.
        self.begin_external_sign_in(provider).await
    }

    async fn begin_external_sign_in(&self, provider: Provider) -> Result<(), InfraError> {
        let url = self.consent_url(provider)?;
        webbrowser::open(&url)
            .map_err(|error| InfraError::Network(format!("failed to open browser: {error}")))
    }

    async fn take_pending_redirect(&self) -> Result<Option<AuthCredential>, InfraError> {
        Ok(None)
    }
}
