//! Proxy Router (C5): maintains a [`PrefixTree`] of room entries from
//! the event stream and decides, per request path, whether to redirect,
//! wait, serve a lobby page, or hand off to a backend.
//!
//! Deliberately framework-agnostic — this module never names an HTTP
//! server type. `roomd` turns a [`Dispatch`] into an actual response
//! (redirect, rendered HTML, or a reverse-proxied call) and drives
//! [`Proxy::wait_for_ready`] off whatever cancellation signal its
//! request framework provides.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

use crate::labels::RoomLabels;
use crate::model::{RoomAction, RoomEvent};
use crate::prefix_tree::PrefixTree;

/// Where a ready room's traffic should be forwarded. `None` when the
/// room opted out of the internal proxy (routing delegated externally,
/// e.g. to a sidecar driven off `proxy.*` label templates).
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub container_id: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub running: bool,
    pub ready: bool,
    pub paused: bool,
    pub handler: Option<ProxyTarget>,
}

impl Entry {
    fn not_running(id: String) -> Self {
        Self {
            id,
            running: false,
            ready: false,
            paused: false,
            handler: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyKind {
    NotFound,
    Paused,
    NotRunning,
    NotReady,
    Ready,
}

/// What the caller should do with one inbound request.
#[derive(Debug)]
pub enum Dispatch {
    /// Issue a 307 to `location` (trailing-slash canonicalization).
    Redirect { location: String },
    /// Render the lobby page for `kind`. `wait_url` is set when the
    /// self-polling script should be embedded (wait-mode on, and the
    /// page isn't a terminal state).
    Lobby { kind: LobbyKind, wait_url: Option<String> },
    /// Strip `prefix` from the original path and forward to `target`.
    Proxy { target: ProxyTarget, prefix: String },
    /// No entry is ready yet for this path; caller should register a
    /// waiter with [`Proxy::wait_for_ready`] and retry on wake.
    Wait { path: String },
}

struct WaitGroup {
    subs: AtomicUsize,
    signal: Notify,
}

/// Maintains the routing tree and in-flight long-poll waiters. Readers
/// (HTTP handlers) take the tree's read lock; the reconciler takes the
/// write lock on each event.
pub struct Proxy {
    tree: RwLock<PrefixTree<Entry>>,
    waiters: std::sync::Mutex<HashMap<String, Arc<WaitGroup>>>,
    wait_mode_enabled: bool,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("wait_mode_enabled", &self.wait_mode_enabled)
            .finish_non_exhaustive()
    }
}

fn clean_path(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        cleaned.push('/');
    }
    cleaned.push_str(path);
    cleaned
}

impl Proxy {
    pub fn new(wait_mode_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            tree: RwLock::new(PrefixTree::new()),
            waiters: std::sync::Mutex::new(HashMap::new()),
            wait_mode_enabled,
        })
    }

    /// Seeds the tree from a fleet snapshot at startup, one entry per
    /// proxy-enabled room. Rooms with proxying disabled by label still
    /// get an entry (so lobby pages and redirects work), just with no
    /// `handler`.
    pub fn seed(&self, rooms: &[(String, HashMap<String, String>, bool, bool)]) {
        let mut tree = self.tree.write().unwrap();
        for (id, container_labels, running, paused) in rooms {
            let Ok(parsed) = RoomLabels::extract(container_labels) else {
                continue;
            };
            let handler = proxy_target(id, &parsed);
            tree.insert(
                &parsed.url,
                Entry {
                    id: id.clone(),
                    running: *running,
                    ready: *running && !*paused,
                    paused: *paused,
                    handler,
                },
            );
        }
    }

    /// Applies one projected room event to the tree per the
    /// action -> entry-transition mapping.
    pub fn apply_event(&self, event: &RoomEvent) {
        let Ok(parsed) = RoomLabels::extract(&event.container_labels) else {
            return;
        };
        let path = parsed.url.clone();

        match event.action {
            RoomAction::Created => {
                self.tree
                    .write()
                    .unwrap()
                    .insert(&path, Entry::not_running(event.id.clone()));
            }
            RoomAction::Started => {
                let mut tree = self.tree.write().unwrap();
                let paused = tree.find(&path).map(|e| e.paused).unwrap_or(false);
                tree.insert(
                    &path,
                    Entry {
                        id: event.id.clone(),
                        running: true,
                        ready: false,
                        paused,
                        handler: None,
                    },
                );
            }
            RoomAction::Ready => {
                let handler = proxy_target(&event.id, &parsed);
                self.tree.write().unwrap().insert(
                    &path,
                    Entry {
                        id: event.id.clone(),
                        running: true,
                        ready: true,
                        paused: false,
                        handler,
                    },
                );
                self.wake_waiters(&path);
            }
            RoomAction::Stopped => {
                self.tree
                    .write()
                    .unwrap()
                    .insert(&path, Entry::not_running(event.id.clone()));
            }
            RoomAction::Paused => {
                self.tree.write().unwrap().insert(
                    &path,
                    Entry {
                        id: event.id.clone(),
                        running: false,
                        ready: false,
                        paused: true,
                        handler: None,
                    },
                );
            }
            RoomAction::Destroyed => {
                self.tree.write().unwrap().remove(&path);
                self.drop_waiters(&path);
            }
        }
    }

    /// Decides what to do with `raw_path`. `has_trailing_slash` and
    /// `wants_wait` come from the inbound request; `uri_is_prefix` is
    /// whether the request's path (ignoring trailing slash) equals the
    /// matched prefix exactly, as opposed to a deeper sub-path.
    pub fn dispatch(&self, raw_path: &str, has_trailing_slash: bool, wants_wait: bool) -> Dispatch {
        let path = clean_path(raw_path);
        let tree = self.tree.read().unwrap();
        let matched = tree.matches(&path);

        let Some((entry, prefix)) = matched else {
            return self.blocked_dispatch(&path, wants_wait, LobbyKind::NotFound);
        };

        if !entry.ready {
            let kind = if entry.paused {
                LobbyKind::Paused
            } else if entry.running {
                LobbyKind::NotReady
            } else {
                LobbyKind::NotRunning
            };
            return self.blocked_dispatch(&path, wants_wait, kind);
        }

        if path == prefix && !has_trailing_slash {
            return Dispatch::Redirect {
                location: format!("{prefix}/"),
            };
        }

        let Some(target) = entry.handler.clone() else {
            return Dispatch::Lobby {
                kind: LobbyKind::Ready,
                wait_url: None,
            };
        };

        Dispatch::Proxy { target, prefix }
    }

    fn blocked_dispatch(&self, path: &str, wants_wait: bool, kind: LobbyKind) -> Dispatch {
        if wants_wait && self.wait_mode_enabled {
            return Dispatch::Wait { path: path.to_string() };
        }
        let wait_url = self
            .wait_mode_enabled
            .then(|| format!("{path}?wait"));
        Dispatch::Lobby { kind, wait_url }
    }

    /// Registers interest in `path` becoming ready and waits until
    /// either it does, or `cancelled` resolves first (client disconnect
    /// or proxy shutdown). Returns `true` if woken by readiness.
    pub async fn wait_for_ready(&self, path: &str, cancelled: impl std::future::Future<Output = ()>) -> bool {
        let wg = {
            let mut waiters = self.waiters.lock().unwrap();
            let wg = waiters
                .entry(path.to_string())
                .or_insert_with(|| {
                    Arc::new(WaitGroup {
                        subs: AtomicUsize::new(0),
                        signal: Notify::new(),
                    })
                })
                .clone();
            wg.subs.fetch_add(1, Ordering::SeqCst);
            wg
        };

        let woken = tokio::select! {
            _ = wg.signal.notified() => true,
            _ = cancelled => false,
        };

        if wg.subs.fetch_sub(1, Ordering::SeqCst) == 1 {
            let mut waiters = self.waiters.lock().unwrap();
            if let Some(current) = waiters.get(path) {
                if Arc::ptr_eq(current, &wg) {
                    waiters.remove(path);
                }
            }
        }

        woken
    }

    fn wake_waiters(&self, path: &str) {
        if let Some(wg) = self.waiters.lock().unwrap().remove(path) {
            wg.signal.notify_waiters();
        }
    }

    fn drop_waiters(&self, path: &str) {
        self.waiters.lock().unwrap().remove(path);
    }

    /// Cancels every in-flight wait, used on shutdown so no request
    /// hangs past the proxy's own lifetime.
    pub fn shutdown(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock().unwrap());
        for (_, wg) in waiters {
            wg.signal.notify_waiters();
        }
    }
}

fn proxy_target(container_id: &str, parsed: &RoomLabels) -> Option<ProxyTarget> {
    if !parsed.proxy_enabled {
        return None;
    }
    let port: u16 = parsed.proxy_port.as_ref()?.parse().ok()?;
    Some(ProxyTarget {
        container_id: container_id.to_string(),
        host: container_id.to_string(),
        port,
    })
}

pub const LOBBY_NOT_FOUND: &str = "<!doctype html><html><head><title>Room not found</title></head><body><h1>404</h1><p>This room does not exist.</p></body></html>";
pub const LOBBY_PAUSED: &str = "<!doctype html><html><head><title>Room paused</title></head><body><h1>Paused</h1><p>This room is paused.</p></body></html>";
pub const LOBBY_NOT_RUNNING: &str = "<!doctype html><html><head><title>Room stopped</title></head><body><h1>Not running</h1><p>This room is not running.</p></body></html>";
pub const LOBBY_READY: &str = "<!doctype html><html><head><title>Room</title></head><body><h1>Ready</h1></body></html>";

/// `not-ready` gets a 2s meta-refresh in addition to the self-polling
/// script embedded when wait-mode is enabled.
pub fn not_ready_html(wait_url: Option<&str>) -> String {
    let script = wait_url
        .map(|url| format!(r#"<script>fetch("{url}").then(()=>location.reload())</script>"#))
        .unwrap_or_default();
    format!(
        r#"<!doctype html><html><head><title>Room starting</title><meta http-equiv="refresh" content="2"></head><body><h1>Starting…</h1>{script}</body></html>"#
    )
}

pub fn not_found_html(wait_url: Option<&str>) -> String {
    render_with_poll(LOBBY_NOT_FOUND, wait_url)
}

pub fn not_running_html(wait_url: Option<&str>) -> String {
    render_with_poll(LOBBY_NOT_RUNNING, wait_url)
}

fn render_with_poll(base: &str, wait_url: Option<&str>) -> String {
    match wait_url {
        Some(url) => base.replacen(
            "</body>",
            &format!(r#"<script>fetch("{url}").then(()=>location.reload())</script></body>"#),
            1,
        ),
        None => base.to_string(),
    }
}

/// Renders the static page for a [`LobbyKind`], embedding the
/// self-polling script when `wait_url` is set.
pub fn lobby_html(kind: LobbyKind, wait_url: Option<&str>) -> String {
    match kind {
        LobbyKind::NotFound => not_found_html(wait_url),
        LobbyKind::Paused => LOBBY_PAUSED.to_string(),
        LobbyKind::NotRunning => not_running_html(wait_url),
        LobbyKind::NotReady => not_ready_html(wait_url),
        LobbyKind::Ready => LOBBY_READY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn labels_for(name: &str, url: &str, proxy_port: Option<&str>) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert(crate::labels::key("instance"), "neko-rooms".to_string());
        m.insert(crate::labels::key("name"), name.to_string());
        m.insert(crate::labels::key("url"), url.to_string());
        m.insert(crate::labels::key("neko_image"), "m1k1o/neko:chromium".to_string());
        m.insert(crate::labels::key("epr.min"), "59000".to_string());
        m.insert(crate::labels::key("epr.max"), "59000".to_string());
        if let Some(port) = proxy_port {
            m.insert(crate::labels::key("proxy.enabled"), "true".to_string());
            m.insert(crate::labels::key("proxy.path"), url.to_string());
            m.insert(crate::labels::key("proxy.port"), port.to_string());
        }
        m
    }

    #[test]
    fn not_matched_path_renders_not_found() {
        let proxy = Proxy::new(true);
        match proxy.dispatch("/room-a", true, false) {
            Dispatch::Lobby { kind, .. } => assert_eq!(kind, LobbyKind::NotFound),
            other => panic!("expected lobby, got {other:?}"),
        }
    }

    #[test]
    fn ready_without_trailing_slash_redirects() {
        let proxy = Proxy::new(true);
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Ready,
            container_labels: labels_for("room-a", "/room-a", Some("8080")),
        });

        match proxy.dispatch("/room-a", false, false) {
            Dispatch::Redirect { location } => assert_eq!(location, "/room-a/"),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn ready_with_trailing_slash_proxies() {
        let proxy = Proxy::new(true);
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Ready,
            container_labels: labels_for("room-a", "/room-a", Some("8080")),
        });

        match proxy.dispatch("/room-a/sub", true, false) {
            Dispatch::Proxy { target, prefix } => {
                assert_eq!(prefix, "/room-a");
                assert_eq!(target.port, 8080);
            }
            other => panic!("expected proxy, got {other:?}"),
        }
    }

    #[test]
    fn paused_room_renders_paused_lobby() {
        let proxy = Proxy::new(true);
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Started,
            container_labels: labels_for("room-a", "/room-a", None),
        });
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Paused,
            container_labels: labels_for("room-a", "/room-a", None),
        });

        match proxy.dispatch("/room-a", true, false) {
            Dispatch::Lobby { kind, .. } => assert_eq!(kind, LobbyKind::Paused),
            other => panic!("expected lobby, got {other:?}"),
        }
    }

    #[test]
    fn destroyed_room_removes_tree_entry() {
        let proxy = Proxy::new(true);
        let labels = labels_for("room-a", "/room-a", Some("8080"));
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Ready,
            container_labels: labels.clone(),
        });
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Destroyed,
            container_labels: labels,
        });

        match proxy.dispatch("/room-a", true, false) {
            Dispatch::Lobby { kind, .. } => assert_eq!(kind, LobbyKind::NotFound),
            other => panic!("expected lobby, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_ready_wakes_on_ready_event() {
        let proxy = Proxy::new(true);
        let labels = labels_for("room-a", "/room-a", Some("8080"));

        let waiter = {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move {
                proxy
                    .wait_for_ready("/room-a", std::future::pending())
                    .await
            })
        };

        tokio::task::yield_now().await;
        proxy.apply_event(&RoomEvent {
            id: "abc123".to_string(),
            action: RoomAction::Ready,
            container_labels: labels,
        });

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_ready_returns_false_on_cancel() {
        let proxy = Proxy::new(true);
        let woken = proxy
            .wait_for_ready("/room-a", async {})
            .await;
        assert!(!woken);
    }
}
