use crate::domain::models::{CalendarConnection, CalendarEvent, DateRange};
use crate::infrastructure::calendar_client::CalendarApiClient;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new token was obtained; the updated connection should replace the
    /// stored one.
    Refreshed(CalendarConnection),
    /// No refresh path exists for this connection.
    Unavailable,
}

/// Token renewal seam. The implicit-grant flows used by both providers
/// issue no refresh token to a public client, so the production impl is
/// [`NoopTokenRefresher`]; the seam exists so a backend-assisted refresh
/// can slot in without touching the fetch path.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        connection: &CalendarConnection,
    ) -> Result<RefreshOutcome, InfraError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTokenRefresher;

#[async_trait]
impl TokenRefresher for NoopTokenRefresher {
    async fn refresh(
        &self,
        _connection: &CalendarConnection,
    ) -> Result<RefreshOutcome, InfraError> {
        Ok(RefreshOutcome::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFetchOutcome {
    /// Events for the window, plus the connection as used (possibly with a
    /// refreshed token the caller should persist).
    Events {
        connection: CalendarConnection,
        events: Vec<CalendarEvent>,
    },
    /// The provider rejected the token and no refresh could fix it; the
    /// connection needs to be re-authenticated.
    ConnectionInvalid,
}

/// Fetches one connection's events for a window, handling token expiry
/// around the call: refresh ahead of a known-expired token when possible,
/// and retry exactly once after a 401.
pub struct EventFetchService<C, R>
where
    C: CalendarApiClient,
    R: TokenRefresher,
{
    client: Arc<C>,
    refresher: Arc<R>,
    now_provider: NowProvider,
}

impl<C, R> EventFetchService<C, R>
where
    C: CalendarApiClient,
    R: TokenRefresher,
{
    pub fn new(client: Arc<C>, refresher: Arc<R>) -> Self {
        Self {
            client,
            refresher,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn fetch_for_connection(
        &self,
        connection: &CalendarConnection,
        range: DateRange,
    ) -> Result<ConnectionFetchOutcome, InfraError> {
        let mut current = connection.clone();

        // Expired by the clock does not mean rejected: when no refresh is
        // available the stored token is still tried, and the provider has
        // the final say.
        if current.is_token_expired((self.now_provider)()) {
            if let RefreshOutcome::Refreshed(updated) = self.refresher.refresh(&current).await? {
                current = updated;
            }
        }

        match self
            .client
            .fetch_events(current.provider, &current.access_token, range)
            .await
        {
            Ok(events) => Ok(ConnectionFetchOutcome::Events {
                connection: current,
                events,
            }),
            Err(InfraError::Unauthorized) => match self.refresher.refresh(&current).await? {
                RefreshOutcome::Refreshed(updated) => {
                    match self
                        .client
                        .fetch_events(updated.provider, &updated.access_token, range)
                        .await
                    {
                        Ok(events) => Ok(ConnectionFetchOutcome::Events {
                            connection: updated,
                            events,
                        }),
                        Err(InfraError::Unauthorized) => {
                            Ok(ConnectionFetchOutcome::ConnectionInvalid)
                        }
                        Err(other) => Err(other),
                    }
                }
                RefreshOutcome::Unavailable => Ok(ConnectionFetchOutcome::ConnectionInvalid),
            },
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Provider, connection_id};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCalendarClient {
        responses: Mutex<VecDeque<Result<Vec<CalendarEvent>, InfraError>>>,
        calls: AtomicUsize,
        seen_tokens: Mutex<Vec<String>>,
    }

    impl FakeCalendarClient {
        fn new(responses: Vec<Result<Vec<CalendarEvent>, InfraError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                seen_tokens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CalendarApiClient for FakeCalendarClient {
        async fn fetch_events(
            &self,
            _provider: Provider,
            access_token: &str,
            _range: DateRange,
        ) -> Result<Vec<CalendarEvent>, InfraError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.seen_tokens
                .lock()
                .expect("token lock")
                .push(access_token.to_string());
            self.responses
                .lock()
                .expect("response lock")
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }
    }

    struct FakeRefresher {
        outcome: RefreshOutcome,
        calls: AtomicUsize,
    }

    impl FakeRefresher {
        fn refreshing(connection: CalendarConnection) -> Self {
            Self {
                outcome: RefreshOutcome::Refreshed(connection),
                calls: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                outcome: RefreshOutcome::Unavailable,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(
            &self,
            _connection: &CalendarConnection,
        ) -> Result<RefreshOutcome, InfraError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.outcome.clone())
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn fixed_now(value: &str) -> NowProvider {
        let now = fixed_time(value);
        Arc::new(move || now)
    }

    fn sample_connection(token: &str, expires_at: &str) -> CalendarConnection {
        CalendarConnection {
            id: connection_id(Provider::Google, "uid-1"),
            provider: Provider::Google,
            email: "person@example.com".to_string(),
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: fixed_time(expires_at),
            connected_at: fixed_time("2026-03-01T09:00:00Z"),
        }
    }

    fn sample_event(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: format!("google:{id}"),
            title: "Standup".to_string(),
            start: fixed_time("2026-03-01T09:00:00Z"),
            end: fixed_time("2026-03-01T09:30:00Z"),
            is_all_day: false,
            description: None,
            location: None,
            provider: Provider::Google,
        }
    }

    fn day_range() -> DateRange {
        DateRange::new(
            fixed_time("2026-03-01T00:00:00Z"),
            fixed_time("2026-03-02T00:00:00Z"),
        )
        .expect("valid range")
    }

    #[tokio::test]
    async fn valid_token_fetches_without_refreshing() {
        let client = Arc::new(FakeCalendarClient::new(vec![Ok(vec![sample_event("e1")])]));
        let refresher = Arc::new(FakeRefresher::unavailable());
        let service = EventFetchService::new(Arc::clone(&client), Arc::clone(&refresher))
            .with_now_provider(fixed_now("2026-03-01T10:00:00Z"));

        let outcome = service
            .fetch_for_connection(&sample_connection("live", "2026-03-01T11:00:00Z"), day_range())
            .await
            .expect("fetch");

        let ConnectionFetchOutcome::Events { events, .. } = outcome else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(refresher.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn expired_token_proceeds_stale_when_refresh_unavailable() {
        let client = Arc::new(FakeCalendarClient::new(vec![Ok(vec![sample_event("e1")])]));
        let refresher = Arc::new(FakeRefresher::unavailable());
        let service = EventFetchService::new(Arc::clone(&client), Arc::clone(&refresher))
            .with_now_provider(fixed_now("2026-03-01T12:00:00Z"));

        let outcome = service
            .fetch_for_connection(&sample_connection("stale", "2026-03-01T11:00:00Z"), day_range())
            .await
            .expect("fetch");

        assert!(matches!(outcome, ConnectionFetchOutcome::Events { .. }));
        assert_eq!(refresher.calls.load(Ordering::Relaxed), 1);
        assert_eq!(
            client.seen_tokens.lock().expect("tokens").as_slice(),
            ["stale".to_string()]
        );
    }

    #[tokio::test]
    async fn expired_token_uses_refreshed_token_when_available() {
        let client = Arc::new(FakeCalendarClient::new(vec![Ok(Vec::new())]));
        let refresher = Arc::new(FakeRefresher::refreshing(sample_connection(
            "renewed",
            "2026-03-01T13:00:00Z",
        )));
        let service = EventFetchService::new(Arc::clone(&client), refresher)
            .with_now_provider(fixed_now("2026-03-01T12:00:00Z"));

        let outcome = service
            .fetch_for_connection(&sample_connection("stale", "2026-03-01T11:00:00Z"), day_range())
            .await
            .expect("fetch");

        let ConnectionFetchOutcome::Events { connection, .. } = outcome else {
            panic!("expected events");
        };
        assert_eq!(connection.access_token, "renewed");
        assert_eq!(
            client.seen_tokens.lock().expect("tokens").as_slice(),
            ["renewed".to_string()]
        );
    }

    #[tokio::test]
    async fn unauthorized_with_no_refresh_marks_connection_invalid() {
        let client = Arc::new(FakeCalendarClient::new(vec![Err(InfraError::Unauthorized)]));
        let refresher = Arc::new(FakeRefresher::unavailable());
        let service = EventFetchService::new(Arc::clone(&client), refresher)
            .with_now_provider(fixed_now("2026-03-01T10:00:00Z"));

        let outcome = service
            .fetch_for_connection(&sample_connection("live", "2026-03-01T11:00:00Z"), day_range())
            .await
            .expect("fetch");

        assert_eq!(outcome, ConnectionFetchOutcome::ConnectionInvalid);
        assert_eq!(client.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unauthorized_retries_once_after_successful_refresh() {
        let client = Arc::new(FakeCalendarClient::new(vec![
            Err(InfraError::Unauthorized),
            Ok(vec![sample_event("e1")]),
        ]));
        let refresher = Arc::new(FakeRefresher::refreshing(sample_connection(
            "renewed",
            "2026-03-01T13:00:00Z",
        )));
        let service = EventFetchService::new(Arc::clone(&client), refresher)
            .with_now_provider(fixed_now("2026-03-01T10:00:00Z"));

        let outcome = service
            .fetch_for_connection(&sample_connection("live", "2026-03-01T11:00:00Z"), day_range())
            .await
            .expect("fetch");

        let ConnectionFetchOutcome::Events { connection, events } = outcome else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(connection.access_token, "renewed");
        assert_eq!(client.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn second_unauthorized_marks_connection_invalid() {
        let client = Arc::new(FakeCalendarClient::new(vec![
            Err(InfraError::Unauthorized),
            Err(InfraError::Unauthorized),
        ]));
        let refresher = Arc::new(FakeRefresher::refreshing(sample_connection(
            "renewed",
            "2026-03-01T13:00:00Z",
        )));
        let service = EventFetchService::new(Arc::clone(&client), refresher)
            .with_now_provider(fixed_now("2026-03-01T10:00:00Z"));

        let outcome = service
            .fetch_for_connection(&sample_connection("live", "2026-03-01T11:00:00Z"), day_range())
            .await
            .expect("fetch");

        assert_eq!(outcome, ConnectionFetchOutcome::ConnectionInvalid);
        assert_eq!(client.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn provider_errors_propagate_without_retry() {
        let client = Arc::new(FakeCalendarClient::new(vec![Err(InfraError::Provider {
            status: 503,
            body: "unavailable".to_string(),
        })]));
        let refresher = Arc::new(FakeRefresher::unavailable());
        let service = EventFetchService::new(Arc::clone(&client), refresher)
            .with_now_provider(fixed_now("2026-03-01T10:00:00Z"));

        let result = service
            .fetch_for_connection(&sample_connection("live", "2026-03-01T11:00:00Z"), day_range())
            .await;

        assert!(matches!(result, Err(InfraError::Provider { status: 503, .. })));
        assert_eq!(client.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn noop_refresher_is_always_unavailable() {
        let refresher = NoopTokenRefresher;
        let outcome = refresher
            .refresh(&sample_connection("live", "2026-03-01T11:00:00Z"))
            .await
            .expect("refresh");
        assert_eq!(outcome, RefreshOutcome::Unavailable);
    }
}
