//! Host Event Projector (C3): turns low-level container lifecycle
//! signals into the five semantic [`RoomEvent`]s the proxy and API
//! consume, probes freshly-started containers for readiness, and fans
//! the result out to any number of listeners.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::error::Error;
use crate::host::{Host, HostSignal};
use crate::model::{RoomAction, RoomEvent};

const READY_PROBE_ATTEMPTS: u32 = 5;
const READY_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Per-subscriber event buffer. A slow consumer drops events past this
/// depth rather than stalling every other subscriber or the host event
/// loop itself.
const SUBSCRIBER_BUFFER: usize = 64;

/// Opaque handle returned by [`EventProjector::subscribe`]; pass back
/// to [`EventProjector::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    events: mpsc::Sender<RoomEvent>,
    errors: mpsc::Sender<Error>,
    dropped: AtomicU64,
}

#[derive(Debug)]
pub struct EventSubscription {
    pub id: SubscriberId,
    pub events: mpsc::Receiver<RoomEvent>,
    pub errors: mpsc::Receiver<Error>,
}

#[derive(Debug, Default)]
pub struct ProjectorCounters {
    pub total_rooms: AtomicU64,
    pub running_rooms: AtomicU64,
}

pub struct EventProjector {
    host: Arc<dyn Host>,
    label_filters: Vec<(String, String)>,
    ready: Mutex<HashSet<String>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    counters: ProjectorCounters,
    loop_handle: Mutex<Option<(JoinHandle<()>, oneshot::Sender<()>)>>,
}

impl std::fmt::Debug for EventProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProjector")
            .field("label_filters", &self.label_filters)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl EventProjector {
    pub fn new(host: Arc<dyn Host>, label_filters: Vec<(String, String)>) -> Arc<Self> {
        Arc::new(Self {
            host,
            label_filters,
            ready: Mutex::new(HashSet::new()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            counters: ProjectorCounters::default(),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn counters(&self) -> (u64, u64) {
        (
            self.counters.total_rooms.load(Ordering::Relaxed),
            self.counters.running_rooms.load(Ordering::Relaxed),
        )
    }

    /// Returns `true` only on the first transition to ready for `id`,
    /// so callers never emit a duplicate `ready` event.
    fn set_ready(&self, id: &str) -> bool {
        self.ready.lock().unwrap().insert(id.to_string())
    }

    fn clear_ready(&self, id: &str) {
        self.ready.lock().unwrap().remove(id);
    }

    /// `true` once `id`'s readiness probe has succeeded and no
    /// subsequent stop/pause has cleared it.
    pub fn is_ready(&self, id: &str) -> bool {
        self.ready.lock().unwrap().contains(id)
    }

    pub fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        let (events_tx, events_rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(1);

        self.subscribers.lock().unwrap().push(Subscriber {
            id,
            events: events_tx,
            errors: errors_tx,
            dropped: AtomicU64::new(0),
        });

        EventSubscription {
            id,
            events: events_rx,
            errors: errors_rx,
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|s| s.id != id);
    }

    /// Fans out to each subscriber's bounded buffer. A lagging
    /// subscriber drops the event (counted, logged) rather than
    /// stalling the host event loop or every other listener; a
    /// subscriber whose receiver has been dropped is pruned.
    fn broadcast(&self, event: RoomEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| match sub.events.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(subscriber = sub.id.0, dropped, "subscriber lagging, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn broadcast_error(&self, err: Error) {
        let subscribers = self.subscribers.lock().unwrap();
        for sub in subscribers.iter() {
            let _ = sub.errors.try_send(Error::new(err.kind, err.message.clone()));
        }
    }

    /// Starts consuming the host's raw event stream in the background.
    /// Idempotent: a second call is a no-op while a loop is running.
    pub fn start_loop(self: &Arc<Self>) {
        let mut guard = self.loop_handle.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let projector = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut stream = projector.host.events(&projector.label_filters);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("event projector loop shutting down");
                        break;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(host_event)) => projector.handle_host_event(host_event).await,
                            Some(Err(err)) => {
                                warn!(error = %err, "host event stream error");
                                projector.broadcast_error(err);
                            }
                            None => {
                                projector.broadcast_error(Error::fatal("host event stream closed"));
                                break;
                            }
                        }
                    }
                }
            }
        });

        *guard = Some((handle, shutdown_tx));
    }

    pub fn stop_loop(&self) {
        if let Some((handle, shutdown_tx)) = self.loop_handle.lock().unwrap().take() {
            let _ = shutdown_tx.send(());
            handle.abort();
        }
    }

    async fn handle_host_event(self: &Arc<Self>, host_event: crate::host::HostEvent) {
        let id = host_event.container_id;
        let labels = host_event.labels;

        let action = match host_event.signal {
            HostSignal::Created => {
                self.counters.total_rooms.fetch_add(1, Ordering::Relaxed);
                Some(RoomAction::Created)
            }
            HostSignal::Started | HostSignal::Unpaused => {
                self.counters.running_rooms.fetch_add(1, Ordering::Relaxed);
                self.spawn_readiness_probe(id.clone(), labels.clone());
                Some(RoomAction::Started)
            }
            HostSignal::HealthHealthy => {
                if self.set_ready(&id) {
                    Some(RoomAction::Ready)
                } else {
                    None
                }
            }
            HostSignal::Stopped => {
                self.clear_ready(&id);
                self.counters.running_rooms.fetch_sub(1, Ordering::Relaxed);
                Some(RoomAction::Stopped)
            }
            HostSignal::Paused => {
                self.clear_ready(&id);
                self.counters.running_rooms.fetch_sub(1, Ordering::Relaxed);
                Some(RoomAction::Paused)
            }
            HostSignal::Destroyed => Some(RoomAction::Destroyed),
        };

        if let Some(action) = action {
            self.broadcast(RoomEvent {
                id,
                action,
                container_labels: labels,
            });
        }
    }

    fn spawn_readiness_probe(
        self: &Arc<Self>,
        id: String,
        labels: std::collections::HashMap<String, String>,
    ) {
        let Some(frontend_port) = frontend_port_from_labels(&labels) else {
            return;
        };

        let projector = Arc::clone(self);
        tokio::spawn(async move {
            for attempt in 0..READY_PROBE_ATTEMPTS {
                if attempt > 0 {
                    sleep(READY_PROBE_INTERVAL).await;
                }

                let probe = format!("cat < /dev/tcp/localhost/{frontend_port}");
                let result = projector
                    .host
                    .exec(&id, vec!["sh".to_string(), "-c".to_string(), probe])
                    .await;

                if result.is_ok() && projector.set_ready(&id) {
                    projector.broadcast(RoomEvent {
                        id: id.clone(),
                        action: RoomAction::Ready,
                        container_labels: labels.clone(),
                    });
                    return;
                }
            }
        });
    }
}

fn frontend_port_from_labels(labels: &std::collections::HashMap<String, String>) -> Option<u16> {
    let value = labels
        .get(&crate::labels::key("mux"))
        .or_else(|| labels.get(&crate::labels::key("epr.min")))?;
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::collections::HashMap;

    struct FakeHost;

    #[async_trait]
    impl Host for FakeHost {
        async fn create_container(&self, _spec: crate::host::ContainerSpec) -> crate::error::Result<String> {
            unimplemented!()
        }
        async fn start_container(&self, _id: &str) -> crate::error::Result<()> {
            unimplemented!()
        }
        async fn stop_container(&self, _id: &str, _timeout_secs: i64) -> crate::error::Result<()> {
            unimplemented!()
        }
        async fn pause_container(&self, _id: &str) -> crate::error::Result<()> {
            unimplemented!()
        }
        async fn unpause_container(&self, _id: &str) -> crate::error::Result<()> {
            unimplemented!()
        }
        async fn remove_container(&self, _id: &str, _timeout_secs: i64) -> crate::error::Result<()> {
            unimplemented!()
        }
        async fn inspect_container(&self, _id: &str) -> crate::error::Result<crate::host::ContainerInspect> {
            unimplemented!()
        }
        async fn list_containers(&self, _label_filters: &[(String, String)]) -> crate::error::Result<Vec<crate::host::ContainerInspect>> {
            unimplemented!()
        }
        fn events(&self, _label_filters: &[(String, String)]) -> BoxStream<'static, crate::error::Result<crate::host::HostEvent>> {
            futures::stream::empty().boxed()
        }
        async fn exec(&self, _id: &str, _argv: Vec<String>) -> crate::error::Result<String> {
            Ok(String::new())
        }
        async fn http_get(&self, _id: &str, _port: u16, _path: &str) -> crate::error::Result<String> {
            unimplemented!()
        }
        fn pull_image(
            &self,
            _image: &str,
            _auth: Option<crate::host::RegistryAuth>,
        ) -> BoxStream<'static, crate::error::Result<crate::host::ImagePullProgress>> {
            futures::stream::empty().boxed()
        }
        async fn inspect_image(&self, _image: &str) -> crate::error::Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn set_ready_transitions_once() {
        let projector = EventProjector::new(Arc::new(FakeHost), vec![("instance".to_string(), "test".to_string())]);
        assert!(projector.set_ready("abc"));
        assert!(!projector.set_ready("abc"));
    }

    #[tokio::test]
    async fn broadcast_prunes_dropped_subscribers() {
        let projector = EventProjector::new(Arc::new(FakeHost), vec![("instance".to_string(), "test".to_string())]);
        let sub = projector.subscribe();
        drop(sub.events);
        drop(sub.errors);

        projector.broadcast(RoomEvent {
            id: "abc".to_string(),
            action: RoomAction::Created,
            container_labels: HashMap::new(),
        });

        assert_eq!(projector.subscribers.lock().unwrap().len(), 0);
    }
}
