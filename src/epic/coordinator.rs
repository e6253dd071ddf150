//! Epic coordinator
//!
//! Owns the hot action log and the UI state. An epic maps the action stream
//! (plus a view of the state) to a stream of new actions; the coordinator
//! runs each epic on its own task and dispatches whatever it emits back
//! into the log.

use std::collections::VecDeque;
use std::future;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::epic::Action;
use crate::stream::BoxStream;

/// Broadcast buffer per subscriber before it starts lagging
const LOG_CAPACITY: usize = 1024;

/// Dispatched actions kept for inspection
pub const DEFAULT_RECENT_ACTIONS: usize = 100;

pub type ActionStream = BoxStream<Action>;
pub type StateStream<S> = watch::Receiver<S>;
pub type Epic<S> = Box<dyn Fn(Actions, StateStream<S>) -> ActionStream + Send + Sync>;

// == Action Source ==
/// Hot source of dispatched actions. Each stream only sees actions
/// dispatched after it was created.
#[derive(Clone)]
pub struct Actions {
    tx: broadcast::Sender<Action>,
}

impl Actions {
    pub fn stream(&self) -> ActionStream {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|received| {
                future::ready(match received {
                    Ok(action) => Some(action),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "action subscriber lagged");
                        None
                    }
                })
            })
            .boxed()
    }

    /// Actions whose type is one of `kinds`.
    pub fn of_type(&self, kinds: &[&str]) -> ActionStream {
        let kinds: Vec<String> = kinds.iter().map(|kind| kind.to_string()).collect();
        self.stream()
            .filter(move |action| future::ready(kinds.iter().any(|kind| action.is(kind))))
            .boxed()
    }
}

#[derive(Clone)]
struct Dispatcher {
    tx: broadcast::Sender<Action>,
    recent: Arc<Mutex<VecDeque<Action>>>,
    recent_capacity: usize,
}

impl Dispatcher {
    fn dispatch(&self, action: Action) -> usize {
        {
            let mut recent = self.recent.lock();
            if recent.len() >= self.recent_capacity {
                recent.pop_front();
            }
            recent.push_back(action.clone());
        }
        debug!(kind = %action.kind, "dispatch");
        // No subscribers is fine: nothing is listening for that type yet.
        self.tx.send(action).unwrap_or(0)
    }
}

// == Coordinator ==
pub struct EpicCoordinator<S> {
    dispatcher: Dispatcher,
    state: watch::Sender<S>,
    running: Mutex<Vec<JoinHandle<()>>>,
}

impl<S> EpicCoordinator<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(initial_state: S) -> Self {
        Self::with_recent_capacity(initial_state, DEFAULT_RECENT_ACTIONS)
    }

    pub fn with_recent_capacity(initial_state: S, recent_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(LOG_CAPACITY);
        let (state, _) = watch::channel(initial_state);
        Self {
            dispatcher: Dispatcher {
                tx,
                recent: Arc::new(Mutex::new(VecDeque::with_capacity(recent_capacity))),
                recent_capacity: recent_capacity.max(1),
            },
            state,
            running: Mutex::new(Vec::new()),
        }
    }

    pub fn actions(&self) -> Actions {
        Actions {
            tx: self.dispatcher.tx.clone(),
        }
    }

    /// Appends an action to the log. Returns how many streams received it.
    pub fn dispatch(&self, action: Action) -> usize {
        self.dispatcher.dispatch(action)
    }

    /// Most recent dispatched actions, oldest first.
    pub fn recent_actions(&self) -> Vec<Action> {
        self.dispatcher.recent.lock().iter().cloned().collect()
    }

    pub fn state(&self) -> S {
        self.state.borrow().clone()
    }

    pub fn state_stream(&self) -> StateStream<S> {
        self.state.subscribe()
    }

    pub fn set_state(&self, state: S) {
        self.state.send_replace(state);
    }

    pub fn update_state(&self, update: impl FnOnce(&mut S)) {
        self.state.send_modify(update);
    }

    /// Starts `epic`; everything it emits is dispatched.
    ///
    /// The epic subscribes to the log before this returns, so actions
    /// dispatched afterwards are never missed.
    pub fn run(&self, epic: Epic<S>) {
        let mut output = epic(self.actions(), self.state.subscribe());
        let dispatcher = self.dispatcher.clone();

        let handle = tokio::spawn(async move {
            while let Some(action) = output.next().await {
                dispatcher.dispatch(action);
            }
            debug!("epic output ended");
        });

        let mut running = self.running.lock();
        running.retain(|handle| !handle.is_finished());
        running.push(handle);
    }

    /// Number of epics still running.
    pub fn running_epics(&self) -> usize {
        let mut running = self.running.lock();
        running.retain(|handle| !handle.is_finished());
        running.len()
    }

    /// Stops every running epic. Their in-flight work is dropped.
    pub fn shutdown(&self) {
        let handles: Vec<_> = self.running.lock().drain(..).collect();
        if !handles.is_empty() {
            info!(epics = handles.len(), "stopping epics");
        }
        for handle in handles {
            handle.abort();
        }
    }
}

impl<S> Drop for EpicCoordinator<S> {
    fn drop(&mut self) {
        for handle in self.running.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Merges several epics into one that feeds every epic the same actions.
pub fn combine_epics<S>(epics: Vec<Epic<S>>) -> Epic<S>
where
    S: Send + Sync + 'static,
{
    Box::new(move |actions: Actions, state: StateStream<S>| {
        futures::stream::select_all(
            epics
                .iter()
                .map(|epic| epic(actions.clone(), state.clone())),
        )
        .boxed()
    })
}
