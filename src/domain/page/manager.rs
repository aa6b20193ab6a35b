//! Page manager: a registry of page actors keyed by `PageKey`.
//!
//! Every page is a tokio task that owns its state. The task publishes
//! snapshots through a `watch` channel and pushes events to attached
//! listeners. Computations run on the blocking pool behind a semaphore
//! sized by `PageConfig::workers`.

use super::listener::{Listener, ListenerId, PageEvent};
use super::{Page, PageData, PageId, PageKey, PageState, PageStatus};
use crate::domain::candle::Timeframe;
use crate::domain::config::PageConfig;
use crate::domain::error::PageError;
use crate::ports::page_source::PageSource;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a page reacts to new source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// `Ready → Updating → Ready`.
    Rebuild,
    /// Recompute while staying `Ready`; listeners get `DataChanged`.
    InPlace,
}

enum PageCommand {
    Attach {
        listener: ListenerId,
        sender: mpsc::UnboundedSender<PageEvent>,
        /// Revision the requester observed when it took the handle.
        seen: u64,
    },
    Detach {
        listener: ListenerId,
    },
    Refresh(RefreshMode),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Load,
    Refresh(RefreshMode),
}

struct Running {
    phase: Phase,
    handle: JoinHandle<Result<PageData, PageError>>,
}

/// Transitions kept for listeners that attach behind the actor.
const HISTORY: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Transition {
    revision: u64,
    old: PageState,
    new: PageState,
}

struct Registration {
    sender: mpsc::UnboundedSender<PageEvent>,
    refs: usize,
}

struct PageActor {
    id: PageId,
    key: Arc<PageKey>,
    source: Arc<dyn PageSource>,
    workers: Arc<Semaphore>,
    runtime: Handle,
    status: watch::Sender<PageStatus>,
    listeners: HashMap<ListenerId, Registration>,
    running: Option<Running>,
    pending: Option<RefreshMode>,
    history: VecDeque<Transition>,
}

impl PageActor {
    fn state(&self) -> PageState {
        self.status.borrow().state
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PageCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PageCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                result = next_result(&mut self.running), if self.running.is_some() => {
                    self.finish(result);
                }
            }
        }
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
        debug!(page = %self.id, key = %self.key, "page discarded");
    }

    fn handle(&mut self, command: PageCommand) {
        match command {
            PageCommand::Attach {
                listener,
                sender,
                seen,
            } => {
                // Replays what happened between the request and this
                // command. Older transitions than `HISTORY` are lost.
                for t in self.history.iter().filter(|t| t.revision > seen) {
                    let _ = sender.send(PageEvent::StateChanged {
                        page: self.id,
                        old: t.old,
                        new: t.new,
                    });
                }
                self.listeners
                    .entry(listener)
                    .or_insert(Registration { sender, refs: 0 })
                    .refs += 1;
            }
            PageCommand::Detach { listener } => {
                if let Some(registration) = self.listeners.get_mut(&listener) {
                    registration.refs = registration.refs.saturating_sub(1);
                    if registration.refs == 0 {
                        self.listeners.remove(&listener);
                    }
                }
            }
            PageCommand::Refresh(mode) => self.refresh(mode),
            PageCommand::Shutdown => {}
        }
    }

    fn load(&mut self) {
        self.transition(PageState::Loading);
        self.start(Phase::Load);
    }

    fn refresh(&mut self, mode: RefreshMode) {
        if self.running.is_some() {
            self.pending = match (self.pending, mode) {
                (Some(RefreshMode::Rebuild), _) | (_, RefreshMode::Rebuild) => Some(RefreshMode::Rebuild),
                _ => Some(RefreshMode::InPlace),
            };
            return;
        }
        match (self.state(), mode) {
            (PageState::Ready, RefreshMode::Rebuild) => {
                self.transition(PageState::Updating);
                self.start(Phase::Refresh(mode));
            }
            (PageState::Ready, RefreshMode::InPlace) => self.start(Phase::Refresh(mode)),
            (state, _) => debug!(page = %self.id, %state, "refresh ignored"),
        }
    }

    fn start(&mut self, phase: Phase) {
        let source = Arc::clone(&self.source);
        let key = Arc::clone(&self.key);
        let workers = Arc::clone(&self.workers);
        let handle = self.runtime.spawn(async move {
            let _permit = workers
                .acquire_owned()
                .await
                .map_err(|_| PageError::Computation {
                    message: "worker pool closed".to_string(),
                })?;
            tokio::task::spawn_blocking(move || source.compute(&key))
                .await
                .map_err(|err| PageError::Computation {
                    message: format!("computation aborted: {err}"),
                })?
        });
        self.running = Some(Running { phase, handle });
    }

    fn finish(&mut self, result: Result<PageData, PageError>) {
        let Some(running) = self.running.take() else {
            return;
        };
        match result {
            Ok(data) => {
                let rows = data.len();
                let data = Arc::new(data);
                let old = self.publish(PageState::Ready, |status| {
                    status.data = Some(data);
                    status.error = None;
                });
                if running.phase == Phase::Refresh(RefreshMode::InPlace) && old == PageState::Ready {
                    debug!(page = %self.id, rows, "page data refreshed");
                    self.broadcast(PageEvent::DataChanged { page: self.id });
                } else {
                    info!(page = %self.id, key = %self.key, rows, "page ready");
                    self.announce(old, PageState::Ready);
                }
                if let Some(mode) = self.pending.take() {
                    self.refresh(mode);
                }
            }
            Err(err) => {
                let message = failure_message(err);
                warn!(page = %self.id, key = %self.key, error = %message, "page computation failed");
                let old = self.publish(PageState::Error, |status| status.error = Some(message));
                self.announce(old, PageState::Error);
                self.pending = None;
            }
        }
    }

    fn transition(&mut self, new: PageState) {
        let old = self.publish(new, |_| {});
        self.announce(old, new);
    }

    /// Publishes `update` and the new state as one snapshot, recording the
    /// transition when the state changes. Returns the previous state.
    fn publish(&mut self, new: PageState, update: impl FnOnce(&mut PageStatus)) -> PageState {
        let old = self.state();
        let mut revision = 0;
        self.status.send_modify(|status| {
            update(status);
            status.state = new;
            if old != new {
                status.revision += 1;
            }
            revision = status.revision;
        });
        if old != new {
            if self.history.len() == HISTORY {
                self.history.pop_front();
            }
            self.history.push_back(Transition { revision, old, new });
        }
        old
    }

    fn announce(&mut self, old: PageState, new: PageState) {
        if old == new {
            return;
        }
        debug!(page = %self.id, %old, %new, "page state changed");
        self.broadcast(PageEvent::StateChanged {
            page: self.id,
            old,
            new,
        });
    }

    fn broadcast(&mut self, event: PageEvent) {
        self.listeners
            .retain(|_, registration| registration.sender.send(event).is_ok());
    }
}

async fn next_result(running: &mut Option<Running>) -> Result<PageData, PageError> {
    match running {
        Some(running) => match (&mut running.handle).await {
            Ok(result) => result,
            Err(err) => Err(PageError::Computation {
                message: format!("computation aborted: {err}"),
            }),
        },
        None => std::future::pending().await,
    }
}

fn failure_message(err: PageError) -> String {
    match err {
        PageError::Computation { message } => message,
        other => other.to_string(),
    }
}

struct Entry {
    page: Page,
    commands: mpsc::UnboundedSender<PageCommand>,
    refs: usize,
}

struct Inner {
    registry: Mutex<HashMap<PageKey, Entry>>,
    source: Arc<dyn PageSource>,
    workers: Arc<Semaphore>,
    runtime: Handle,
    next_id: AtomicU64,
}

/// Shared, deduplicating page cache. Cheap to clone.
#[derive(Clone)]
pub struct PageManager {
    inner: Arc<Inner>,
}

impl PageManager {
    /// Binds the manager to the tokio runtime it is created on.
    pub fn new(source: Arc<dyn PageSource>, config: &PageConfig) -> Result<Self, PageError> {
        let runtime = Handle::try_current().map_err(|_| PageError::NoRuntime)?;
        Ok(Self::with_handle(source, config, runtime))
    }

    pub fn with_handle(source: Arc<dyn PageSource>, config: &PageConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(HashMap::new()),
                source,
                workers: Arc::new(Semaphore::new(config.workers.max(1))),
                runtime,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the page for `key`, creating and loading it if needed.
    ///
    /// A page already `Ready` produces no event for this listener; check
    /// `Page::has_data` after the call.
    pub fn request(&self, key: PageKey, listener: &mut Listener) -> Page {
        let mut registry = self.inner.registry.lock();

        if let Some(entry) = registry.get_mut(&key) {
            let (state, seen) = entry.page.revision();
            if state != PageState::Error {
                let attached = entry
                    .commands
                    .send(PageCommand::Attach {
                        listener: listener.id(),
                        sender: listener.sender(),
                        seen,
                    })
                    .is_ok();
                if attached {
                    entry.refs += 1;
                    listener.attach(entry.page.id());
                    debug!(page = %entry.page.id(), refs = entry.refs, "page shared");
                    return entry.page.clone();
                }
            }
            if let Some(stale) = registry.remove(&key) {
                debug!(page = %stale.page.id(), %state, "replacing page");
                let _ = stale.commands.send(PageCommand::Shutdown);
            }
        }

        let id = PageId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let key = Arc::new(key);
        let (status, receiver) = watch::channel(PageStatus::empty());
        let (commands, inbox) = mpsc::unbounded_channel();
        let page = Page::new(id, Arc::clone(&key), receiver);

        listener.attach(id);
        let mut listeners = HashMap::new();
        listeners.insert(
            listener.id(),
            Registration {
                sender: listener.sender(),
                refs: 1,
            },
        );

        let mut actor = PageActor {
            id,
            key: Arc::clone(&key),
            source: Arc::clone(&self.inner.source),
            workers: Arc::clone(&self.inner.workers),
            runtime: self.inner.runtime.clone(),
            status,
            listeners,
            running: None,
            pending: None,
            history: VecDeque::new(),
        };
        info!(page = %id, key = %key, "page created");
        actor.load();
        self.inner.runtime.spawn(actor.run(inbox));

        registry.insert(
            (*key).clone(),
            Entry {
                page: page.clone(),
                commands,
                refs: 1,
            },
        );
        page
    }

    /// Drops one request of `listener` on `page`. The page is discarded
    /// when its last request is released. Returns false when the listener
    /// held no request on it.
    pub fn release(&self, page: &Page, listener: &mut Listener) -> bool {
        if !listener.detach(page.id()) {
            return false;
        }
        let mut registry = self.inner.registry.lock();
        let Some(entry) = registry.get_mut(page.key()) else {
            return true;
        };
        if entry.page.id() != page.id() {
            // Already replaced after an error.
            return true;
        }

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = registry.remove(page.key()) {
                debug!(page = %page.id(), "page released");
                let _ = entry.commands.send(PageCommand::Shutdown);
            }
        } else {
            let _ = entry.commands.send(PageCommand::Detach {
                listener: listener.id(),
            });
        }
        true
    }

    /// Refreshes every live page computed from `symbol` at `timeframe`.
    /// Returns how many pages were notified.
    pub fn source_updated(&self, symbol: &str, timeframe: Timeframe, mode: RefreshMode) -> usize {
        let registry = self.inner.registry.lock();
        let notified = registry
            .values()
            .filter(|entry| entry.page.key().covers(symbol, timeframe))
            .filter(|entry| entry.commands.send(PageCommand::Refresh(mode)).is_ok())
            .count();
        info!(symbol, %timeframe, ?mode, notified, "source updated");
        notified
    }

    /// Pages currently held by at least one listener.
    pub fn page_count(&self) -> usize {
        self.inner.registry.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::page::{Column, TimeRange};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Counting {
        calls: AtomicUsize,
    }

    impl PageSource for Counting {
        fn compute(&self, _key: &PageKey) -> Result<PageData, PageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(PageData {
                timestamps: Vec::new(),
                columns: vec![Column {
                    name: "call".into(),
                    values: vec![call as f64],
                }],
            })
        }
    }

    fn key() -> PageKey {
        PageKey::candles("BTCUSDT", Timeframe::H1, TimeRange::all())
    }

    async fn next(listener: &mut Listener) -> PageEvent {
        tokio::time::timeout(Duration::from_secs(5), listener.next_event())
            .await
            .expect("timed out waiting for page event")
            .expect("listener channel closed")
    }

    #[test]
    fn new_requires_runtime() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let result = PageManager::new(source, &PageConfig::default());
        assert_eq!(result.err(), Some(PageError::NoRuntime));
    }

    #[tokio::test]
    async fn first_listener_sees_loading_then_ready() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let manager = PageManager::new(source, &PageConfig::default()).unwrap();
        let mut listener = Listener::new();
        let page = manager.request(key(), &mut listener);
        assert_eq!(page.state(), PageState::Loading);

        assert_eq!(
            next(&mut listener).await,
            PageEvent::StateChanged {
                page: page.id(),
                old: PageState::Empty,
                new: PageState::Loading,
            }
        );
        assert_eq!(
            next(&mut listener).await,
            PageEvent::StateChanged {
                page: page.id(),
                old: PageState::Loading,
                new: PageState::Ready,
            }
        );
        assert!(page.has_data());
    }

    fn idle_actor() -> (PageActor, Page) {
        let (status, receiver) = watch::channel(PageStatus::empty());
        let id = PageId(u64::MAX);
        let key = Arc::new(key());
        let actor = PageActor {
            id,
            key: Arc::clone(&key),
            source: Arc::new(Counting {
                calls: AtomicUsize::new(0),
            }),
            workers: Arc::new(Semaphore::new(1)),
            runtime: Handle::current(),
            status,
            listeners: HashMap::new(),
            running: None,
            pending: None,
            history: VecDeque::new(),
        };
        (actor, Page::new(id, key, receiver))
    }

    #[tokio::test]
    async fn late_attach_replays_each_missed_transition() {
        let (mut actor, page) = idle_actor();
        actor.transition(PageState::Loading);
        let (state, seen) = page.revision();
        assert_eq!((state, seen), (PageState::Loading, 1));

        actor.transition(PageState::Ready);
        actor.transition(PageState::Updating);

        let mut listener = Listener::new();
        listener.attach(page.id());
        actor.handle(PageCommand::Attach {
            listener: listener.id(),
            sender: listener.sender(),
            seen,
        });
        let change = |old, new| PageEvent::StateChanged {
            page: page.id(),
            old,
            new,
        };
        assert_eq!(
            listener.drain(),
            vec![
                change(PageState::Loading, PageState::Ready),
                change(PageState::Ready, PageState::Updating),
            ]
        );
        assert_eq!(page.revision(), (PageState::Updating, 3));
    }

    #[tokio::test]
    async fn attach_in_step_with_actor_replays_nothing() {
        let (mut actor, page) = idle_actor();
        actor.transition(PageState::Loading);
        actor.transition(PageState::Ready);
        let (_, seen) = page.revision();

        let mut listener = Listener::new();
        listener.attach(page.id());
        actor.handle(PageCommand::Attach {
            listener: listener.id(),
            sender: listener.sender(),
            seen,
        });
        assert!(listener.drain().is_empty());
    }

    #[tokio::test]
    async fn in_place_refresh_keeps_ready() {
        let source = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let manager = PageManager::new(source, &PageConfig::default()).unwrap();
        let mut listener = Listener::new();
        let page = manager.request(key(), &mut listener);
        next(&mut listener).await;
        next(&mut listener).await;
        assert_eq!(page.state(), PageState::Ready);

        assert_eq!(
            manager.source_updated("BTCUSDT", Timeframe::H1, RefreshMode::InPlace),
            1
        );
        assert_eq!(
            next(&mut listener).await,
            PageEvent::DataChanged { page: page.id() }
        );
        let data = page.data().unwrap();
        assert_eq!(data.column("call").unwrap().values, vec![2.0]);
        assert_eq!(page.state(), PageState::Ready);
    }
}
