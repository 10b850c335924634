//! Live queries over the board store.
//!
//! Every completed write bumps a generation counter on the [`ChangeNotifier`].
//! A [`LiveQuery`] re-runs its query function whenever that counter moves or its
//! dependency key changes. Invalidation is deliberately coarse: any write
//! invalidates every live query, so there is no dependency graph to keep in sync.
//!
//! A query starts out [`QueryState::Loading`] and only leaves that state once the
//! first evaluation finishes. `Ready(None)` and `Ready(vec![])` are real results
//! and never mean "still loading".

use crate::{db::KanbanDb, error::Result};
use std::{future::Future, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

/// Broadcasts "data changed" to every live query
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Publishes one change event
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    /// Number of change events published so far
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// What a live query currently shows its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState<T> {
    Loading,
    Ready(T),
    Failed(String),
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}

enum KeySource<K> {
    Owned(watch::Sender<K>),
    Shared(watch::Receiver<K>),
}

/// Subscription to a query that re-evaluates on every store change.
///
/// Dropping the handle stops re-evaluation. Writes issued elsewhere are not
/// affected; their results are simply no longer observed here.
pub struct LiveQuery<K, T> {
    key: KeySource<K>,
    state_rx: watch::Receiver<QueryState<T>>,
    task: JoinHandle<()>,
}

impl<K, T> LiveQuery<K, T>
where
    K: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Starts a live query whose key is changed through [`LiveQuery::set_key`].
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F, Fut>(db: KanbanDb, key: K, query: F) -> Self
    where
        F: Fn(KanbanDb, K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (key_tx, key_rx) = watch::channel(key);
        let (state_rx, task) = Self::start(db, key_rx, query);
        Self {
            key: KeySource::Owned(key_tx),
            state_rx,
            task,
        }
    }

    /// Starts a live query keyed on a value owned by someone else, such as the
    /// active board selection
    pub fn follow<F, Fut>(db: KanbanDb, key_rx: watch::Receiver<K>, query: F) -> Self
    where
        F: Fn(KanbanDb, K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (state_rx, task) = Self::start(db, key_rx.clone(), query);
        Self {
            key: KeySource::Shared(key_rx),
            state_rx,
            task,
        }
    }

    fn start<F, Fut>(
        db: KanbanDb,
        key_rx: watch::Receiver<K>,
        query: F,
    ) -> (watch::Receiver<QueryState<T>>, JoinHandle<()>)
    where
        F: Fn(KanbanDb, K) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(QueryState::Loading);
        let changes = db.changes();
        let task = tokio::spawn(run_query(db, key_rx, changes, query, state_tx));
        (state_rx, task)
    }

    pub fn state(&self) -> QueryState<T> {
        self.state_rx.borrow().clone()
    }

    pub fn key(&self) -> K {
        match &self.key {
            KeySource::Owned(tx) => tx.borrow().clone(),
            KeySource::Shared(rx) => rx.borrow().clone(),
        }
    }

    /// Changes the dependency key. Returns false for queries that follow a
    /// shared key, which only its owner can change.
    pub fn set_key(&self, key: K) -> bool {
        match &self.key {
            KeySource::Owned(tx) => {
                tx.send_replace(key);
                true
            }
            KeySource::Shared(_) => false,
        }
    }

    /// Waits for the next published state. Returns `None` once the query task
    /// has stopped, for instance because the query function panicked; no further
    /// states will follow.
    pub async fn changed(&mut self) -> Option<QueryState<T>> {
        self.state_rx.changed().await.ok()?;
        Some(self.state_rx.borrow_and_update().clone())
    }

    /// Waits until the state satisfies `pred`, checking the current state first.
    /// Returns the last state as is if the query task stops before that.
    pub async fn wait_for(&mut self, pred: impl Fn(&QueryState<T>) -> bool) -> QueryState<T> {
        loop {
            {
                let state = self.state_rx.borrow_and_update();
                if pred(&state) {
                    return state.clone();
                }
            }
            if self.state_rx.changed().await.is_err() {
                return self.state_rx.borrow().clone();
            }
        }
    }

    /// Waits for the first result (or failure)
    pub async fn wait_ready(&mut self) -> QueryState<T> {
        self.wait_for(|state| !state.is_loading()).await
    }
}

impl<K, T> Drop for LiveQuery<K, T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_query<K, T, F, Fut>(
    db: KanbanDb,
    mut key_rx: watch::Receiver<K>,
    mut changes: watch::Receiver<u64>,
    query: F,
    state_tx: watch::Sender<QueryState<T>>,
) where
    K: Clone,
    F: Fn(KanbanDb, K) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut key_open = true;
    loop {
        // Mark both inputs seen before evaluating so a write that lands while the
        // query runs schedules another pass
        let key = key_rx.borrow_and_update().clone();
        let generation = *changes.borrow_and_update();

        let next = match query(db.clone(), key).await {
            Ok(value) => QueryState::Ready(value),
            Err(err) => QueryState::Failed(err.to_string()),
        };
        if state_tx.send(next).is_err() {
            return;
        }
        debug!(generation, "live query evaluated");

        loop {
            tokio::select! {
                res = key_rx.changed(), if key_open => match res {
                    Ok(()) => break,
                    Err(_) => key_open = false,
                },
                res = changes.changed() => match res {
                    Ok(()) => break,
                    Err(_) => return,
                },
            }
        }
    }
}
