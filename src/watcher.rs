// System
use std::{convert::Infallible, fmt};

// Third Party
use futures::{
    future::BoxFuture,
    stream::{BoxStream, StreamExt},
    FutureExt,
};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, WatchEvent, WatchParams},
    Client, Config,
};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

// Local
use crate::{
    error::Error,
    utils::{LABEL_SELECTOR, RECONNECT_DELAY, WATCH_RESOURCE_VERSION, WATCH_TIMEOUT_SECS},
};

pub type PodWatchStream<'a> = BoxStream<'a, Result<WatchEvent<Pod>, kube::Error>>;

/// Something that can open a watch subscription on pods.
pub trait PodEventSource {
    fn open(&self) -> BoxFuture<'_, Result<PodWatchStream<'_>, kube::Error>>;
}

/// Watches labelled pods in every namespace through the Kubernetes API.
pub struct KubePodSource {
    pods: Api<Pod>,
    params: WatchParams,
}

impl KubePodSource {
    pub fn new(client: &Client) -> Self {
        Self {
            pods: Api::all(client.clone()),
            params: watch_params(),
        }
    }
}

/// Left unset, kube-rs sends a 290s timeout anyway and rejects anything at or above 295s, so
/// sessions are bounded either way. Make that bound explicit.
pub fn watch_params() -> WatchParams {
    WatchParams::default()
        .labels(LABEL_SELECTOR)
        .timeout(WATCH_TIMEOUT_SECS)
}

impl PodEventSource for KubePodSource {
    fn open(&self) -> BoxFuture<'_, Result<PodWatchStream<'_>, kube::Error>> {
        async move {
            // Existing pods show up as Added on every reconnect
            let stream = self
                .pods
                .watch(&self.params, WATCH_RESOURCE_VERSION)
                .await?;
            Ok(stream.boxed())
        }
        .boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// A single pod lifecycle transition, rendered as one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEvent {
    pub kind: EventKind,
    pub namespace: String,
    pub name: String,
    pub phase: String,
    /// Only known for updates.
    pub ready: Option<bool>,
}

impl PodEvent {
    fn new(kind: EventKind, pod: &Pod) -> Self {
        let phase = match kind {
            EventKind::Deleted => String::new(),
            _ => pod
                .status
                .as_ref()
                .and_then(|status| status.phase.clone())
                .unwrap_or_default(),
        };
        let ready = match kind {
            EventKind::Updated => Some(is_pod_ready(pod)),
            _ => None,
        };
        Self {
            kind,
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name: pod.metadata.name.clone().unwrap_or_default(),
            phase,
            ready,
        }
    }
}

impl fmt::Display for PodEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Created => write!(
                f,
                "[CREATED] {}/{} | Phase={}",
                self.namespace, self.name, self.phase
            ),
            EventKind::Updated => write!(
                f,
                "[UPDATED] {}/{} | Phase={} Ready={}",
                self.namespace,
                self.name,
                self.phase,
                self.ready.unwrap_or(false)
            ),
            EventKind::Deleted => write!(f, "[DELETED] {}/{}", self.namespace, self.name),
        }
    }
}

/// A pod is ready when it carries a `Ready` condition with status `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map_or(false, |conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
}

/// Map a watch notification to the lifecycle event it represents, if any. Bookmarks and error
/// objects don't carry a pod and yield nothing.
pub fn classify(event: &WatchEvent<Pod>) -> Option<PodEvent> {
    match event {
        WatchEvent::Added(pod) => Some(PodEvent::new(EventKind::Created, pod)),
        WatchEvent::Modified(pod) => Some(PodEvent::new(EventKind::Updated, pod)),
        WatchEvent::Deleted(pod) => Some(PodEvent::new(EventKind::Deleted, pod)),
        WatchEvent::Bookmark(bookmark) => {
            debug!(
                "Skipping bookmark at resource version {}",
                bookmark.metadata.resource_version
            );
            None
        }
        WatchEvent::Error(response) => {
            debug!("Skipping error notification: {}", response.message);
            None
        }
    }
}

/// Why a watch session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The server closed the stream.
    Closed,
    /// The watch could not be opened, or the stream broke.
    Failed(kube::Error),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Closed => write!(f, "stream closed"),
            SessionEnd::Failed(error) => write!(f, "{}", error),
        }
    }
}

/// Drain one watch stream, handing every lifecycle event to `on_event` in delivery order.
/// Undecodable notifications are skipped; any other stream error ends the session.
pub async fn consume<F>(mut stream: PodWatchStream<'_>, mut on_event: F) -> SessionEnd
where
    F: FnMut(PodEvent),
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if let Some(pod_event) = classify(&event) {
                    on_event(pod_event);
                }
            }
            Err(kube::Error::SerdeError(error)) => {
                debug!("Skipping notification that is not a pod: {}", error);
            }
            Err(error) => return SessionEnd::Failed(error),
        }
    }
    SessionEnd::Closed
}

/// Logs pod lifecycle transitions, reopening the watch whenever it ends.
pub struct PodWatcher<S> {
    source: S,
    reconnect_delay: Duration,
}

impl PodWatcher<KubePodSource> {
    pub fn new(client: &Client) -> Self {
        Self::with_source(KubePodSource::new(client))
    }
}

impl<S: PodEventSource> PodWatcher<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Build a watcher from the outcome of credential resolution. Any failure here is fatal and
    /// nothing is subscribed to; the source is only created once a client exists.
    pub fn connect<F>(resolved: Result<Config, Error>, make_source: F) -> Result<Self, Error>
    where
        F: FnOnce(Client) -> S,
    {
        let client = resolved.and_then(|config| Ok(Client::try_from(config)?));
        match client {
            Ok(client) => Ok(Self::with_source(make_source(client))),
            Err(e) => {
                error!("Cannot connect to the cluster: {}", e);
                Err(e)
            }
        }
    }

    /// Open a subscription and stream it to the log until it ends.
    pub async fn watch_once(&self) -> SessionEnd {
        info!("Watching pods matching {} in all namespaces...", LABEL_SELECTOR);
        match self.source.open().await {
            Ok(stream) => consume(stream, |event| info!("{}", event)).await,
            Err(e) => {
                error!("Failed to open pod watch: {}", e);
                SessionEnd::Failed(e)
            }
        }
    }

    /// Watch forever. Every way a session can end leads to the same fixed delay and a fresh
    /// subscription, so this never returns.
    pub async fn run(&self) -> Infallible {
        loop {
            let end = self.watch_once().await;
            warn!(
                "Watch ended: {}. Reconnecting in {}s...",
                end,
                self.reconnect_delay.as_secs()
            );
            time::sleep(self.reconnect_delay).await;
        }
    }
}
