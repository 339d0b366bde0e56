// Queue lifecycle module
//
// This module provides the state machine an FsQueue moves through during one
// commit cycle, and the events it emits while running tasks.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Where a queue is in its single commit cycle.
///
/// `Pending → Running → Committed`. A task failure leaves the queue in
/// `Running` for good: nothing is retried or rolled back, and no further
/// registrations or commits are accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    /// Registrations allowed, no task has run
    Pending,
    /// `commit()` has begun (and possibly failed)
    Running,
    /// Every task finished; the queue is inert
    Committed,
}

impl QueueState {
    /// Whether tasks and requirements may still be registered
    pub fn accepts_registrations(self) -> bool {
        self == QueueState::Pending
    }

    /// Whether `commit()` has been called at least once
    pub fn has_started(self) -> bool {
        self != QueueState::Pending
    }
}

/// Events emitted while a commit runs
///
/// Task indices are registration positions, starting at zero.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    /// Commit accepted, about to run `total_tasks` tasks
    CommitStarted { total_tasks: usize },

    /// A task is about to run
    TaskStarted { index: usize, description: String },

    /// A task completed successfully
    TaskFinished { index: usize },

    /// A task failed; the commit stops here
    TaskFailed {
        index: usize,
        description: String,
        message: String,
    },

    /// Every task completed
    Committed { tasks_run: usize },
}

/// Lifecycle tracker with event emission
///
/// Owns the [`QueueState`] of one queue and a broadcast channel that
/// observers (progress reporting, tests) can subscribe to. Emitting never
/// fails; events sent while nobody listens are dropped.
#[derive(Debug)]
pub struct QueueLifecycle {
    state: QueueState,
    events_tx: broadcast::Sender<QueueEvent>,
}

impl QueueLifecycle {
    /// Create a pending lifecycle with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self {
            state: QueueState::Pending,
            events_tx,
        }
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Move from `Pending` to `Running`.
    ///
    /// Returns false, leaving the state unchanged, if a commit already began.
    pub fn begin(&mut self, total_tasks: usize) -> bool {
        if self.state.has_started() {
            return false;
        }

        self.state = QueueState::Running;
        self.emit(QueueEvent::CommitStarted { total_tasks });
        true
    }

    /// Move from `Running` to `Committed`.
    pub fn finish(&mut self, tasks_run: usize) {
        debug_assert_eq!(self.state, QueueState::Running);
        self.state = QueueState::Committed;
        self.emit(QueueEvent::Committed { tasks_run });
    }

    pub fn emit(&self, event: QueueEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events_tx.send(event);
    }

    /// Subscribe to future lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for QueueLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Log queue events until the commit ends or the queue is dropped.
///
/// Returns the event that ended the commit (`Committed` or `TaskFailed`),
/// if one was received. Lagging behind the channel skips events but keeps
/// listening, so the final outcome is still seen.
pub async fn log_events(mut events: broadcast::Receiver<QueueEvent>) -> Option<QueueEvent> {
    let mut outcome = None;

    loop {
        match events.recv().await {
            Ok(event) => {
                match &event {
                    QueueEvent::CommitStarted { total_tasks } => {
                        tracing::debug!("Commit started: {} task(s)", total_tasks)
                    }
                    QueueEvent::TaskStarted { index, description } => {
                        tracing::debug!("[{}] {}", index, description)
                    }
                    QueueEvent::TaskFinished { .. } => {}
                    QueueEvent::TaskFailed { index, message, .. } => {
                        tracing::error!("[{}] failed: {}", index, message)
                    }
                    QueueEvent::Committed { tasks_run } => {
                        tracing::info!("{} task(s) committed", tasks_run)
                    }
                }

                match event {
                    QueueEvent::Committed { .. } => return Some(event),
                    QueueEvent::TaskFailed { .. } => outcome = Some(event),
                    _ => {}
                }
            }
            Err(RecvError::Closed) => {
                tracing::debug!("Queue event channel closed");
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Queue event listener lagged - {} events were skipped", skipped);
                // Continue receiving - this is a recoverable error
            }
        }
    }

    outcome
}
