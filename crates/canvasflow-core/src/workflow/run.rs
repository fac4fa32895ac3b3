//! Per-run bookkeeping: the locked `WorkflowState`, its listeners, and the
//! settle signal.
//!
//! Every mutation goes through [`RunHandle::update_if`]. The state is changed
//! under the run's lock, a snapshot is queued, and the queue is drained to the
//! listeners after the lock is released. A single caller drains at a time, so
//! listeners see snapshots in the order the mutations happened even when a
//! listener itself pauses or resumes the run.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use canvasflow_types::graph::WorkflowGraph;
use canvasflow_types::state::{WorkflowState, WorkflowStatus};
use tokio::sync::watch;

/// Callback invoked with the full run state on every change.
pub type Listener = Arc<dyn Fn(&WorkflowState) + Send + Sync>;

/// Coarse view of a run, watched by `wait_until_settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunSignal {
    pub status: WorkflowStatus,
    pub driving: bool,
}

impl RunSignal {
    /// Not running and no driver left to change that.
    pub fn is_settled(&self) -> bool {
        self.status != WorkflowStatus::Running && !self.driving
    }
}

pub(crate) struct RunSlot {
    pub state: WorkflowState,
    /// A drive loop currently owns this run.
    pub driver_active: bool,
    outbox: VecDeque<WorkflowState>,
    delivering: bool,
}

pub(crate) struct RunHandle {
    graph: Arc<WorkflowGraph>,
    slot: Mutex<RunSlot>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    signal: watch::Sender<RunSignal>,
}

impl RunHandle {
    pub fn new(graph: Arc<WorkflowGraph>, state: WorkflowState) -> Self {
        let (signal, _) = watch::channel(RunSignal {
            status: state.status,
            driving: false,
        });
        Self {
            graph,
            slot: Mutex::new(RunSlot {
                state,
                driver_active: false,
                outbox: VecDeque::new(),
                delivering: false,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            signal,
        }
    }

    pub fn graph(&self) -> &Arc<WorkflowGraph> {
        &self.graph
    }

    fn lock(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> WorkflowState {
        self.lock().state.clone()
    }

    /// Read the state under the lock without notifying anyone.
    pub fn read<R>(&self, f: impl FnOnce(&RunSlot) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate the run; listeners are notified only when `f` returns `true`.
    pub fn update_if(&self, f: impl FnOnce(&mut RunSlot) -> bool) -> bool {
        let changed = {
            let mut slot = self.lock();
            let changed = f(&mut slot);
            if changed {
                let snapshot = slot.state.clone();
                slot.outbox.push_back(snapshot);
            }
            self.refresh_signal(&slot);
            changed
        };
        if changed {
            self.deliver();
        }
        changed
    }

    /// Mutate the run and notify listeners.
    pub fn update(&self, f: impl FnOnce(&mut RunSlot)) {
        self.update_if(|slot| {
            f(slot);
            true
        });
    }

    fn refresh_signal(&self, slot: &RunSlot) {
        let next = RunSignal {
            status: slot.state.status,
            driving: slot.driver_active,
        };
        self.signal.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn deliver(&self) {
        {
            let mut slot = self.lock();
            if slot.delivering {
                return;
            }
            slot.delivering = true;
        }

        loop {
            let next = {
                let mut slot = self.lock();
                match slot.outbox.pop_front() {
                    Some(state) => state,
                    None => {
                        slot.delivering = false;
                        return;
                    }
                }
            };

            let listeners: Vec<Listener> = self
                .lock_listeners()
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&next))).is_err() {
                    tracing::warn!(run_id = %next.id, "workflow listener panicked");
                }
            }
        }
    }

    pub fn add_listener(&self, listener: Listener) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    pub fn watch(&self) -> watch::Receiver<RunSignal> {
        self.signal.subscribe()
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("graph_id", &self.graph.id)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
