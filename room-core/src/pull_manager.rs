//! Pull Manager (C6): single-flight, cancellable image pull with
//! per-layer progress aggregation and pub/sub fan-out to any number of
//! SSE-style subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::host::{Host, ImagePullProgress, RegistryAuth};
use crate::model::{ProgressDetail, PullLayer, PullState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<String>,
}

struct ActivePull {
    cancel: tokio::sync::oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

pub struct PullManager {
    host: Arc<dyn Host>,
    allowed_images: Vec<String>,
    state: Mutex<PullState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
    active: Mutex<Option<ActivePull>>,
}

impl std::fmt::Debug for PullManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullManager").finish_non_exhaustive()
    }
}

impl PullManager {
    pub fn new(host: Arc<dyn Host>, allowed_images: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            host,
            allowed_images,
            state: Mutex::new(PullState::default()),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
            active: Mutex::new(None),
        })
    }

    pub fn state(&self) -> PullState {
        self.state.lock().unwrap().clone()
    }

    pub fn subscribe(&self, buffer: usize) -> (SubscriberId, mpsc::Receiver<String>) {
        let id = SubscriberId(self.next_subscriber_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(buffer);
        self.subscribers.lock().unwrap().push(Subscriber { id, sender: tx });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().unwrap().retain(|s| s.id != id);
    }

    fn broadcast_line(&self, line: &str) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|s| s.sender.try_send(line.to_string()).is_ok());
    }

    /// Starts pulling `image`, failing with `Conflict` if a pull is
    /// already active. Returns once the pull has been accepted; progress
    /// streams to subscribers asynchronously. `auth` carries registry
    /// credentials for a private image, passed through to the host
    /// unchanged.
    pub fn start(self: &Arc<Self>, image: &str, auth: Option<RegistryAuth>) -> Result<()> {
        if !self.allowed_images.iter().any(|allowed| allowed == image) {
            return Err(Error::invalid_input(format!("image not allowed: {image}")));
        }

        let mut active = self.active.lock().unwrap();
        if active.is_some() {
            return Err(Error::conflict("pull already in progress"));
        }

        {
            let mut state = self.state.lock().unwrap();
            *state = PullState {
                active: true,
                started_at: Some(Utc::now()),
                finished_at: None,
                layers: Vec::new(),
                status_lines: Vec::new(),
            };
        }

        let (cancel_tx, mut cancel_rx) = tokio::sync::oneshot::channel();
        let manager = Arc::clone(self);
        let image = image.to_string();

        let worker = tokio::spawn(async move {
            let mut stream = manager.host.pull_image(&image, auth);
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        info!(image = %image, "image pull cancelled");
                        break;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(progress)) => manager.apply_progress(progress),
                            Some(Err(err)) => {
                                warn!(error = %err, "image pull stream error");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            manager.finish();
        });

        *active = Some(ActivePull {
            cancel: cancel_tx,
            worker,
        });
        Ok(())
    }

    fn apply_progress(&self, progress: ImagePullProgress) {
        let line = serde_json::to_string(&serde_json::json!({
            "id": progress.id,
            "status": progress.status,
            "progress": progress.progress,
        }))
        .unwrap_or_default();
        self.broadcast_line(&line);

        let mut state = self.state.lock().unwrap();
        if progress.current.is_some() || progress.total.is_some() {
            let Some(id) = progress.id.clone() else { return };
            if let Some(existing) = state.layers.iter_mut().find(|l| l.id == id) {
                existing.status = progress.status;
                existing.progress = progress.progress.clone().unwrap_or_default();
                existing.progress_detail = Some(ProgressDetail {
                    current: progress.current,
                    total: progress.total,
                });
            } else {
                state.layers.push(PullLayer {
                    id,
                    status: progress.status,
                    progress: progress.progress.clone().unwrap_or_default(),
                    progress_detail: Some(ProgressDetail {
                        current: progress.current,
                        total: progress.total,
                    }),
                });
            }
        } else {
            state.status_lines.push(progress.status);
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.active = false;
        state.finished_at = Some(Utc::now());
        *self.active.lock().unwrap() = None;
    }

    /// Cancels the in-flight pull, failing with `Conflict` when none is
    /// active.
    pub fn stop(&self) -> Result<()> {
        match self.active.lock().unwrap().take() {
            Some(active) => {
                let _ = active.cancel.send(());
                active.worker.abort();
                Ok(())
            }
            None => Err(Error::conflict("no pull in progress")),
        }
    }

    /// Cancels any active pull and closes every subscriber channel.
    /// Unlike `stop`, this is a no-op (not an error) when nothing is
    /// active, since it also runs unconditionally during shutdown.
    pub fn shutdown(&self) {
        let _ = self.stop();
        self.subscribers.lock().unwrap().clear();
    }

    pub fn last_finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().finished_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct FakeHost;

    #[async_trait]
    impl Host for FakeHost {
        async fn create_container(&self, _spec: crate::host::ContainerSpec) -> Result<String> {
            unimplemented!()
        }
        async fn start_container(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn stop_container(&self, _id: &str, _timeout_secs: i64) -> Result<()> {
            unimplemented!()
        }
        async fn pause_container(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn unpause_container(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn remove_container(&self, _id: &str, _timeout_secs: i64) -> Result<()> {
            unimplemented!()
        }
        async fn inspect_container(&self, _id: &str) -> Result<crate::host::ContainerInspect> {
            unimplemented!()
        }
        async fn list_containers(&self, _label_filters: &[(String, String)]) -> Result<Vec<crate::host::ContainerInspect>> {
            unimplemented!()
        }
        fn events(&self, _label_filters: &[(String, String)]) -> BoxStream<'static, Result<crate::host::HostEvent>> {
            futures::stream::empty().boxed()
        }
        async fn exec(&self, _id: &str, _argv: Vec<String>) -> Result<String> {
            unimplemented!()
        }
        async fn http_get(&self, _id: &str, _port: u16, _path: &str) -> Result<String> {
            unimplemented!()
        }
        async fn inspect_image(&self, _image: &str) -> Result<Option<String>> {
            Ok(None)
        }
        fn pull_image(
            &self,
            _image: &str,
            _auth: Option<RegistryAuth>,
        ) -> BoxStream<'static, Result<ImagePullProgress>> {
            futures::stream::iter(vec![
                Ok(ImagePullProgress {
                    id: Some("layer1".to_string()),
                    status: "Downloading".to_string(),
                    progress: Some("[=> ] 1B/10B".to_string()),
                    current: Some(1),
                    total: Some(10),
                }),
                Ok(ImagePullProgress {
                    id: None,
                    status: "Pull complete".to_string(),
                    progress: None,
                    current: None,
                    total: None,
                }),
            ])
            .boxed()
        }
    }

    #[test]
    fn rejects_disallowed_image() {
        let manager = PullManager::new(Arc::new(FakeHost), vec!["allowed:latest".to_string()]);
        let err = manager.start("denied:latest", None).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn second_start_conflicts_while_active() {
        let manager = PullManager::new(Arc::new(FakeHost), vec!["allowed:latest".to_string()]);
        manager.start("allowed:latest", None).unwrap();
        // mark active eagerly, before the worker has a chance to finish
        let err = manager.start("allowed:latest", None).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn stop_without_active_pull_conflicts() {
        let manager = PullManager::new(Arc::new(FakeHost), vec!["allowed:latest".to_string()]);
        let err = manager.stop().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }
}
