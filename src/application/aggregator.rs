use crate::application::connections::CalendarConnectionManager;
use crate::application::fetch::{ConnectionFetchOutcome, EventFetchService, TokenRefresher};
use crate::domain::models::{CalendarEvent, DateRange};
use crate::infrastructure::calendar_client::CalendarApiClient;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::provider_auth::ProviderAuthAdapter;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(Vec<CalendarEvent>),
    /// A previous poll is still in flight; nothing was fetched.
    SkippedBusy,
}

/// Fans one fetch window out across every connected account and merges the
/// results into a single start-ordered list. One bad account never hides
/// the others: fetch failures drop that account's events for the round,
/// and definitively invalid connections are disconnected.
pub struct EventAggregator<S, A, C, R>
where
    S: CredentialStore + 'static,
    A: ProviderAuthAdapter + 'static,
    C: CalendarApiClient + 'static,
    R: TokenRefresher + 'static,
{
    manager: Arc<CalendarConnectionManager<S, A>>,
    fetcher: Arc<EventFetchService<C, R>>,
    poll_guard: tokio::sync::Mutex<()>,
}

impl<S, A, C, R> EventAggregator<S, A, C, R>
where
    S: CredentialStore + 'static,
    A: ProviderAuthAdapter + 'static,
    C: CalendarApiClient + 'static,
    R: TokenRefresher + 'static,
{
    pub fn new(
        manager: Arc<CalendarConnectionManager<S, A>>,
        fetcher: Arc<EventFetchService<C, R>>,
    ) -> Self {
        Self {
            manager,
            fetcher,
            poll_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn fetch_all(&self, range: DateRange) -> Result<Vec<CalendarEvent>, InfraError> {
        let connections = self.manager.list_connections()?;
        if connections.is_empty() {
            return Ok(Vec::new());
        }

        let mut join_set = JoinSet::new();
        for (index, connection) in connections.iter().cloned().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            join_set.spawn(async move {
                let outcome = fetcher.fetch_for_connection(&connection, range).await;
                (index, outcome)
            });
        }

        // Completion order is arbitrary; slot results back by index so the
        // merge below walks connections in their stored order.
        let mut results: Vec<Option<Result<ConnectionFetchOutcome, InfraError>>> =
            (0..connections.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            // A panicked fetch task counts as that one connection failing
            // for the round, same as a fetch error.
            let Ok((index, outcome)) = joined else {
                continue;
            };
            results[index] = Some(outcome);
        }

        let mut events = Vec::new();
        for (connection, result) in connections.iter().zip(results) {
            match result {
                Some(Ok(ConnectionFetchOutcome::Events {
                    connection: used,
                    events: fetched,
                })) => {
                    if used.access_token != connection.access_token {
                        self.manager.update_connection(&used)?;
                    }
                    events.extend(fetched);
                }
                Some(Ok(ConnectionFetchOutcome::ConnectionInvalid)) => {
                    self.manager.disconnect(&connection.id)?;
                }
                // Transient failure for this account only; the round
                // continues with whatever the others returned.
                Some(Err(_)) | None => {}
            }
        }

        events.sort_by_key(|event| event.start);
        Ok(events)
    }

    /// Timer-driven entry point. Overlapping polls are collapsed: if one
    /// round is still running, the new tick is skipped instead of queued.
    pub async fn poll_events(&self, range: DateRange) -> Result<PollOutcome, InfraError> {
        let Ok(_guard) = self.poll_guard.try_lock() else {
            return Ok(PollOutcome::SkippedBusy);
        };
        let events = self.fetch_all(range).await?;
        Ok(PollOutcome::Completed(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fetch::NoopTokenRefresher;
    use crate::domain::models::{CalendarConnection, Provider, connection_id};
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::provider_auth::{AuthCredential, InteractiveAuthResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    struct NullAuthAdapter;

    #[async_trait]
    impl ProviderAuthAdapter for NullAuthAdapter {
        async fn sign_in_popup(
            &self,
            _provider: Provider,
        ) -> Result<InteractiveAuthResult, InfraError> {
            Err(InfraError::PopupBlocked)
        }

        async fn begin_redirect_sign_in(&self, _provider: Provider) -> Result<(), InfraError> {
            Ok(())
        }

        async fn begin_external_sign_in(&self, _provider: Provider) -> Result<(), InfraError> {
            Ok(())
        }

        async fn take_pending_redirect(&self) -> Result<Option<AuthCredential>, InfraError> {
            Ok(None)
        }
    }

    /// Maps each access token to a canned response; unknown tokens are
    /// rejected as unauthorized.
    #[derive(Default)]
    struct TokenKeyedClient {
        responses: HashMap<String, Result<Vec<CalendarEvent>, InfraError>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl CalendarApiClient for TokenKeyedClient {
        async fn fetch_events(
            &self,
            _provider: Provider,
            access_token: &str,
            _range: DateRange,
        ) -> Result<Vec<CalendarEvent>, InfraError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if access_token == "panicking-token" {
                panic!("simulated fetch panic");
            }
            match self.responses.get(access_token) {
                Some(Ok(events)) => Ok(events.clone()),
                Some(Err(InfraError::Unauthorized)) => Err(InfraError::Unauthorized),
                Some(Err(_)) => Err(InfraError::Provider {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
                None => Err(InfraError::Unauthorized),
            }
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn connection(provider: Provider, uid: &str, token: &str) -> CalendarConnection {
        CalendarConnection {
            id: connection_id(provider, uid),
            provider,
            email: format!("{uid}@example.com"),
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: fixed_time("2026-03-01T11:00:00Z"),
            connected_at: fixed_time("2026-03-01T09:00:00Z"),
        }
    }

    fn event(provider: Provider, id: &str, start: &str) -> CalendarEvent {
        CalendarEvent {
            id: format!("{}:{id}", provider.as_str()),
            title: id.to_string(),
            start: fixed_time(start),
            end: fixed_time(start) + chrono::Duration::minutes(30),
            is_all_day: false,
            description: None,
            location: None,
            provider,
        }
    }

    async fn aggregator_with(
        connections: Vec<CalendarConnection>,
        client: TokenKeyedClient,
    ) -> EventAggregator<InMemoryCredentialStore, NullAuthAdapter, TokenKeyedClient, NoopTokenRefresher>
    {
        let store = Arc::new(InMemoryCredentialStore::default());
        for connection in &connections {
            store.upsert(connection).expect("seed connection");
        }
        let manager = Arc::new(
            CalendarConnectionManager::new(store, Arc::new(NullAuthAdapter), false)
                .with_now_provider(Arc::new(|| {
                    DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                        .expect("valid datetime")
                        .with_timezone(&Utc)
                })),
        );
        manager.initialize().await.expect("initialize");

        let fetcher = Arc::new(
            EventFetchService::new(Arc::new(client), Arc::new(NoopTokenRefresher))
                .with_now_provider(Arc::new(|| {
                    DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                        .expect("valid datetime")
                        .with_timezone(&Utc)
                })),
        );
        EventAggregator::new(manager, fetcher)
    }

    fn day_range() -> DateRange {
        DateRange::new(
            fixed_time("2026-03-01T00:00:00Z"),
            fixed_time("2026-03-02T00:00:00Z"),
        )
        .expect("valid range")
    }

    #[tokio::test]
    async fn merges_events_across_connections_sorted_by_start() {
        let mut client = TokenKeyedClient::default();
        client.responses.insert(
            "google-token".to_string(),
            Ok(vec![
                event(Provider::Google, "g-late", "2026-03-01T15:00:00Z"),
                event(Provider::Google, "g-early", "2026-03-01T08:00:00Z"),
            ]),
        );
        client.responses.insert(
            "ms-token".to_string(),
            Ok(vec![event(Provider::Microsoft, "m-mid", "2026-03-01T12:00:00Z")]),
        );

        let aggregator = aggregator_with(
            vec![
                connection(Provider::Google, "uid-1", "google-token"),
                connection(Provider::Microsoft, "uid-2", "ms-token"),
            ],
            client,
        )
        .await;

        let events = aggregator.fetch_all(day_range()).await.expect("fetch all");
        let ids: Vec<&str> = events.iter().map(|event| event.id.as_str()).collect();
        assert_eq!(ids, ["google:g-early", "microsoft:m-mid", "google:g-late"]);
    }

    #[tokio::test]
    async fn one_failing_connection_does_not_hide_the_others() {
        let mut client = TokenKeyedClient::default();
        client.responses.insert(
            "google-token".to_string(),
            Err(InfraError::Provider {
                status: 503,
                body: "unavailable".to_string(),
            }),
        );
        client.responses.insert(
            "ms-token".to_string(),
            Ok(vec![event(Provider::Microsoft, "m-1", "2026-03-01T12:00:00Z")]),
        );

        let aggregator = aggregator_with(
            vec![
                connection(Provider::Google, "uid-1", "google-token"),
                connection(Provider::Microsoft, "uid-2", "ms-token"),
            ],
            client,
        )
        .await;

        let events = aggregator.fetch_all(day_range()).await.expect("fetch all");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "microsoft:m-1");

        // transient failure keeps the connection
        let remaining = aggregator.manager.list_connections().expect("list");
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn panicking_fetch_task_only_loses_that_connection() {
        let mut client = TokenKeyedClient::default();
        client.responses.insert(
            "ms-token".to_string(),
            Ok(vec![event(Provider::Microsoft, "m-1", "2026-03-01T12:00:00Z")]),
        );

        let aggregator = aggregator_with(
            vec![
                connection(Provider::Google, "uid-1", "panicking-token"),
                connection(Provider::Microsoft, "uid-2", "ms-token"),
            ],
            client,
        )
        .await;

        let events = aggregator.fetch_all(day_range()).await.expect("fetch all");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "microsoft:m-1");

        // a crashed task is treated as transient, the connection stays
        let remaining = aggregator.manager.list_connections().expect("list");
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_connection_is_disconnected() {
        let mut client = TokenKeyedClient::default();
        client
            .responses
            .insert("dead-token".to_string(), Err(InfraError::Unauthorized));
        client.responses.insert(
            "ms-token".to_string(),
            Ok(vec![event(Provider::Microsoft, "m-1", "2026-03-01T12:00:00Z")]),
        );

        let aggregator = aggregator_with(
            vec![
                connection(Provider::Google, "uid-1", "dead-token"),
                connection(Provider::Microsoft, "uid-2", "ms-token"),
            ],
            client,
        )
        .await;

        let events = aggregator.fetch_all(day_range()).await.expect("fetch all");
        assert_eq!(events.len(), 1);

        let remaining = aggregator.manager.list_connections().expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "microsoft-uid-2");
    }

    #[tokio::test]
    async fn empty_connection_set_completes_with_no_events() {
        let aggregator = aggregator_with(Vec::new(), TokenKeyedClient::default()).await;
        let events = aggregator.fetch_all(day_range()).await.expect("fetch all");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn overlapping_polls_are_skipped_not_queued() {
        let mut client = TokenKeyedClient::default();
        client.delay = Some(Duration::from_millis(200));
        client.responses.insert(
            "google-token".to_string(),
            Ok(vec![event(Provider::Google, "g-1", "2026-03-01T09:00:00Z")]),
        );

        let aggregator =
            aggregator_with(vec![connection(Provider::Google, "uid-1", "google-token")], client)
                .await;

        let (first, second) = tokio::join!(
            aggregator.poll_events(day_range()),
            aggregator.poll_events(day_range())
        );

        let first = first.expect("first poll");
        let second = second.expect("second poll");
        let outcomes = [first, second];
        assert!(outcomes.iter().any(|outcome| outcome == &PollOutcome::SkippedBusy));
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, PollOutcome::Completed(events) if events.len() == 1)));
    }
}
