use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use super::slot::{LatestSlot, Loadable, SlotUpdates};
use crate::services::hub::{HubClient, Subscription};
use crate::services::portal::ApiError;

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// A server collection a view keeps on screen. Every refresh re-runs the
/// whole fetch and replaces the value; nothing is patched in place.
pub struct LiveResource<T> {
    name: &'static str,
    slot: Arc<LatestSlot<T>>,
    fetch: Fetcher<T>,
}

impl<T> Clone for LiveResource<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            slot: self.slot.clone(),
            fetch: self.fetch.clone(),
        }
    }
}

impl<T> LiveResource<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: &'static str, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            name,
            slot: Arc::new(LatestSlot::new()),
            fetch: Arc::new(move || -> BoxFuture<'static, Result<T, ApiError>> { Box::pin(fetch()) }),
        }
    }

    pub fn get(&self) -> Loadable<T> {
        self.slot.get()
    }

    pub fn updates(&self) -> SlotUpdates<T> {
        self.slot.updates()
    }

    /// Runs one fetch and applies it unless a later fetch already landed.
    /// Read failures become [`Loadable::Failed`].
    pub async fn refresh(&self) -> Loadable<T> {
        let ticket = self.slot.begin();
        let value = match (self.fetch)().await {
            Ok(value) => Loadable::Loaded(value),
            Err(err) => {
                warn!(resource = self.name, error = %err, "refresh failed");
                Loadable::Failed(err.user_message())
            }
        };
        let applied = self.slot.apply(ticket, value);
        debug!(resource = self.name, seq = ticket.seq(), applied, "refresh finished");
        self.slot.get()
    }

    /// Awaits `mutation`; on success re-fetches. A failed mutation is handed
    /// back untouched and nothing is re-fetched.
    pub async fn mutate<R, Fut>(&self, mutation: Fut) -> Result<R, ApiError>
    where
        Fut: Future<Output = Result<R, ApiError>>,
    {
        let out = mutation.await?;
        self.refresh().await;
        Ok(out)
    }

    /// Re-fetches whenever one of `events` arrives on the hub. Each push
    /// starts its own fetch; the slot keeps the newest.
    pub fn refresh_on(&self, hub: &HubClient, events: &[&str]) -> Vec<Subscription> {
        events
            .iter()
            .map(|event| {
                let resource = self.clone();
                let event_name = event.to_string();
                hub.subscribe(event, move |_| {
                    debug!(resource = resource.name, event = %event_name, "push event, refreshing");
                    let resource = resource.clone();
                    tokio::spawn(async move {
                        resource.refresh().await;
                    });
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectPolicy;
    use crate::services::hub::memory::MemoryConnector;
    use crate::services::hub::{APPOINTMENT_CANCELLED, APPOINTMENT_CREATED};
    use crate::services::portal::mock_portal::MockPortal;
    use crate::services::portal::PortalApi;
    use std::time::Duration;

    fn count_resource(api: Arc<MockPortal>) -> LiveResource<u64> {
        LiveResource::new("appointments_count", move || {
            let api = api.clone();
            async move { api.appointments_count().await }
        })
    }

    #[tokio::test]
    async fn failed_read_renders_message() {
        let api = Arc::new(MockPortal::default());
        *api.fail_reads.lock().unwrap() = true;

        let resource = count_resource(api);
        assert!(matches!(resource.refresh().await, Loadable::Failed(_)));
    }

    #[tokio::test]
    async fn failed_mutation_skips_refresh() {
        let api = Arc::new(MockPortal::default());
        let resource = count_resource(api.clone());

        let err: Result<(), ApiError> = resource
            .mutate(async {
                Err(ApiError::Status {
                    endpoint: "appointment/Cancel",
                    status: 409,
                })
            })
            .await;
        assert!(err.is_err());
        assert_eq!(api.calls("appointments_count"), 0);

        resource.mutate(async { Ok(()) }).await.unwrap();
        assert_eq!(api.calls("appointments_count"), 1);
        assert_eq!(resource.get(), Loadable::Loaded(0));
    }

    #[tokio::test]
    async fn rapid_push_events_converge_on_server_truth() {
        let api = Arc::new(MockPortal::default());
        // first fetch is slow, second returns at once
        *api.count_delays.lock().unwrap() = vec![Duration::from_millis(250), Duration::ZERO];
        let resource = count_resource(api.clone());

        let (connector, mut servers) = MemoryConnector::new();
        let hub = HubClient::new(
            "ws://hub.test/appointmentHub",
            connector,
            ReconnectPolicy::default(),
        );
        let _subscriptions = resource.refresh_on(&hub, &[APPOINTMENT_CREATED, APPOINTMENT_CANCELLED]);
        hub.start_connection().await.unwrap();
        let server = servers.recv().await.unwrap();

        *api.appointments_total.lock().unwrap() = 1;
        server.push_event(APPOINTMENT_CREATED, vec![]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        *api.appointments_total.lock().unwrap() = 2;
        server.push_event(APPOINTMENT_CREATED, vec![]);

        // outlive the slow first fetch
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(api.calls("appointments_count"), 2);
        assert_eq!(resource.get(), Loadable::Loaded(2));
    }

    #[tokio::test]
    async fn dropping_subscriptions_stops_refreshes() {
        let api = Arc::new(MockPortal::default());
        let resource = count_resource(api);
        let (connector, _servers) = MemoryConnector::new();
        let hub = HubClient::new("ws://hub.test/appointmentHub", connector, ReconnectPolicy::default());

        let subscriptions = resource.refresh_on(&hub, &[APPOINTMENT_CREATED, APPOINTMENT_CANCELLED]);
        assert_eq!(hub.handler_count(APPOINTMENT_CREATED), 1);
        drop(subscriptions);
        assert_eq!(hub.handler_count(APPOINTMENT_CREATED), 0);
        assert_eq!(hub.handler_count(APPOINTMENT_CANCELLED), 0);
    }
}
