use crate::api::database::MessageStore;
use crate::api::events::{ChatEvent, ChildEvent, SyncEvent, SyncEventKind};
use crate::api::models::Message;
use crate::feed::Feed;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

struct Listener {
    epoch: u64,
    task: JoinHandle<()>,
}

/// Keeps at most one child-added listener on the message collection and
/// forwards what it hears to the UI thread as [`ChatEvent::Feed`].
///
/// Must be used from within a tokio runtime; `attach` and `post` spawn.
pub struct FeedSynchronizer<S> {
    store: Arc<S>,
    events: UnboundedSender<ChatEvent>,
    listener: Option<Listener>,
    last_epoch: u64,
}

impl<S: MessageStore> FeedSynchronizer<S> {
    pub fn new(store: Arc<S>, events: UnboundedSender<ChatEvent>) -> Self {
        Self {
            store,
            events,
            listener: None,
            last_epoch: 0,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Epoch of the live listener, if any.
    pub fn epoch(&self) -> Option<u64> {
        self.listener.as_ref().map(|l| l.epoch)
    }

    pub fn attach(&mut self) {
        if self.listener.is_some() {
            return;
        }
        self.last_epoch += 1;
        let epoch = self.last_epoch;
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let task = tokio::spawn(listen(store, epoch, events));
        self.listener = Some(Listener { epoch, task });
        log::info!("feed listener attached (epoch {})", epoch);
    }

    /// Stops the listener. The feed itself is left alone.
    pub fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.task.abort();
            log::info!("feed listener detached (epoch {})", listener.epoch);
        }
    }

    /// Applies one forwarded event; events from a detached listener are
    /// dropped. A closed stream releases the listener so the next `attach`
    /// opens a fresh one. Returns true when the feed grew.
    pub fn accept(&mut self, event: SyncEvent, feed: &mut Feed) -> bool {
        if self.epoch() != Some(event.epoch) {
            log::debug!("dropping feed event from stale epoch {}", event.epoch);
            return false;
        }
        match event.kind {
            SyncEventKind::Appended(message) => {
                feed.push(message);
                true
            }
            SyncEventKind::Closed(reason) => {
                log::warn!("feed stream closed (epoch {}): {}", event.epoch, reason);
                self.listener = None;
                false
            }
        }
    }

    /// Fire-and-forget write; failures are only logged.
    pub fn post(&self, message: Message) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.push(&message).await {
                Ok(key) => log::debug!("posted message {}", key),
                Err(e) => log::error!("failed to post message: {}", e),
            }
        });
    }
}

impl<S> Drop for FeedSynchronizer<S> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.task.abort();
        }
    }
}

async fn listen<S: MessageStore>(store: Arc<S>, epoch: u64, events: UnboundedSender<ChatEvent>) {
    let send = |kind| events.send(ChatEvent::Feed(SyncEvent { epoch, kind })).is_ok();

    let mut rx = match store.listen().await {
        Ok(rx) => rx,
        Err(e) => {
            log::warn!("could not open feed stream: {}", e);
            send(SyncEventKind::Closed(e.to_string()));
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        match event {
            ChildEvent::Added { key, value } => match serde_json::from_value::<Message>(value) {
                Ok(message) => {
                    if !send(SyncEventKind::Appended(message)) {
                        return;
                    }
                }
                Err(e) => log::warn!("skipping undecodable message {}: {}", key, e),
            },
            ChildEvent::Cancelled(reason) => {
                send(SyncEventKind::Closed(reason));
                return;
            }
            ChildEvent::Changed { .. } | ChildEvent::Removed { .. } | ChildEvent::Moved { .. } => {}
        }
    }
    log::debug!("feed stream for epoch {} ended", epoch);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// In-memory message collection. Pushed messages are echoed to every open
    /// listener, like the backend does.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub listens: AtomicUsize,
        pub pushed: Mutex<Vec<Message>>,
        listeners: Mutex<Vec<mpsc::Sender<ChildEvent>>>,
        pub fail_listen: bool,
    }

    impl MemoryStore {
        pub fn emit(&self, event: ChildEvent) {
            let listeners = self.listeners.lock().unwrap().clone();
            for tx in listeners {
                let _ = tx.try_send(event.clone());
            }
        }

        pub fn listen_count(&self) -> usize {
            self.listens.load(Ordering::SeqCst)
        }

        pub fn pushed(&self) -> Vec<Message> {
            self.pushed.lock().unwrap().clone()
        }
    }

    impl MessageStore for MemoryStore {
        async fn listen(&self) -> Result<mpsc::Receiver<ChildEvent>> {
            self.listens.fetch_add(1, Ordering::SeqCst);
            if self.fail_listen {
                return Err(Error::Status {
                    status: 401,
                    message: "Permission denied".into(),
                });
            }
            let (tx, rx) = mpsc::channel(64);
            self.listeners.lock().unwrap().push(tx);
            Ok(rx)
        }

        async fn push(&self, message: &Message) -> Result<String> {
            let key = {
                let mut pushed = self.pushed.lock().unwrap();
                pushed.push(message.clone());
                format!("-N{:04}", pushed.len())
            };
            self.emit(ChildEvent::Added {
                key: key.clone(),
                value: serde_json::to_value(message)?,
            });
            Ok(key)
        }
    }

    pub(crate) async fn wait_for<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event")
            .expect("channel closed")
    }

    fn added(key: &str, name: &str, text: &str) -> ChildEvent {
        ChildEvent::Added {
            key: key.into(),
            value: json!({"name": name, "text": text}),
        }
    }

    #[tokio::test]
    async fn feed_order_matches_delivery_order() {
        let store = Arc::new(MemoryStore::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(Arc::clone(&store), tx);
        sync.attach();
        wait_for(|| store.listen_count() == 1).await;

        store.emit(added("-Nc", "C", "third key, first delivered"));
        store.emit(added("-Na", "A", "second"));
        store.emit(ChildEvent::Changed { key: "-Na".into() });
        store.emit(added("-Nb", "B", "third"));

        let mut feed = Feed::new();
        for _ in 0..3 {
            let ChatEvent::Feed(event) = next_event(&mut rx).await else {
                panic!("expected a feed event");
            };
            assert!(sync.accept(event, &mut feed));
        }
        let authors: Vec<_> = feed.iter().map(|m| m.author().to_string()).collect();
        assert_eq!(authors, ["C", "A", "B"]);
    }

    #[tokio::test]
    async fn attach_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(Arc::clone(&store), tx);
        sync.attach();
        let epoch = sync.epoch();
        sync.attach();
        assert_eq!(sync.epoch(), epoch);

        wait_for(|| store.listen_count() == 1).await;
        store.emit(added("-Na", "A", "only once"));
        let _ = next_event(&mut rx).await;
        assert_eq!(store.listen_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_without_attach_is_noop() {
        let store = Arc::new(MemoryStore::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(store, tx);
        sync.detach();
        sync.detach();
        assert!(!sync.is_attached());
    }

    #[tokio::test]
    async fn events_from_detached_listener_are_dropped() {
        let store = Arc::new(MemoryStore::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(Arc::clone(&store), tx);
        sync.attach();
        wait_for(|| store.listen_count() == 1).await;
        store.emit(added("-Na", "A", "late"));
        let ChatEvent::Feed(late) = next_event(&mut rx).await else {
            panic!("expected a feed event");
        };

        sync.detach();
        let mut feed = Feed::new();
        assert!(!sync.accept(late.clone(), &mut feed));

        sync.attach();
        assert!(!sync.accept(late, &mut feed));
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn undecodable_records_are_skipped() {
        let store = Arc::new(MemoryStore::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(Arc::clone(&store), tx);
        sync.attach();
        wait_for(|| store.listen_count() == 1).await;

        store.emit(ChildEvent::Added {
            key: "-Nx".into(),
            value: json!(42),
        });
        store.emit(added("-Ny", "Y", "ok"));

        let mut feed = Feed::new();
        let ChatEvent::Feed(event) = next_event(&mut rx).await else {
            panic!("expected a feed event");
        };
        assert!(sync.accept(event, &mut feed));
        assert_eq!(feed.iter().next(), Some(&Message::text("Y", "ok")));
    }

    #[tokio::test]
    async fn listen_failure_is_reported_as_closed() {
        let store = Arc::new(MemoryStore {
            fail_listen: true,
            ..MemoryStore::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(store, tx);
        sync.attach();

        let ChatEvent::Feed(event) = next_event(&mut rx).await else {
            panic!("expected a feed event");
        };
        assert!(matches!(event.kind, SyncEventKind::Closed(_)));
        let mut feed = Feed::new();
        assert!(!sync.accept(event, &mut feed));
        assert!(!sync.is_attached());
    }

    #[tokio::test]
    async fn closed_stream_allows_reattach() {
        let store = Arc::new(MemoryStore::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sync = FeedSynchronizer::new(Arc::clone(&store), tx);
        sync.attach();
        wait_for(|| store.listen_count() == 1).await;

        store.emit(ChildEvent::Cancelled("auth_revoked: token expired".into()));
        let ChatEvent::Feed(closed) = next_event(&mut rx).await else {
            panic!("expected a feed event");
        };
        let mut feed = Feed::new();
        sync.accept(closed.clone(), &mut feed);
        assert!(!sync.is_attached());

        sync.attach();
        wait_for(|| store.listen_count() == 2).await;
        // A late close from the old stream must not release the new listener.
        sync.accept(closed, &mut feed);
        assert!(sync.is_attached());
    }

    #[tokio::test]
    async fn post_writes_through_the_store() {
        let store = Arc::new(MemoryStore::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let sync = FeedSynchronizer::new(Arc::clone(&store), tx);
        sync.post(Message::text("Alice", "hi"));
        wait_for(|| store.pushed().len() == 1).await;
        assert_eq!(store.pushed()[0], Message::text("Alice", "hi"));
    }
}
