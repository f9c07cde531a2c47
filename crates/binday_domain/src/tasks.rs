//! Registry of named, cooperatively cancellable background tasks.
//!
//! At most one task is live per id. Starting a task under an id that is
//! already in use cancels the previous task, and the new task only invokes
//! its operation once the previous one has settled, so two runs sharing an
//! id never overlap.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Finished,
    Canceled,
}

/// Handle to one registered task. Cloning is cheap and every clone observes
/// the same completion.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: Arc<str>,
    generation: u64,
    token: CancellationToken,
    done: watch::Receiver<Option<TaskOutcome>>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Resolves once the task has stopped, whether it ran to completion or
    /// observed its cancellation.
    pub async fn wait(&self) -> TaskOutcome {
        let mut done = self.done.clone();
        let settled = done
            .wait_for(Option::is_some)
            .await
            .map(|outcome| *outcome)
            .ok()
            .flatten();
        settled.unwrap_or(TaskOutcome::Canceled)
    }
}

/// Live tasks by id, plus tasks that were cancelled in bulk and may still be
/// winding down. A run under a stopping id waits for that task as well.
#[derive(Debug, Default)]
struct Entries {
    live: HashMap<String, TaskHandle>,
    stopping: HashMap<String, TaskHandle>,
}

#[derive(Debug, Default)]
struct Registry {
    entries: Mutex<Entries>,
    next_generation: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct TaskRunner {
    registry: Arc<Registry>,
    runtime: Handle,
}

impl TaskRunner {
    pub fn new(runtime: Handle) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            runtime,
        }
    }

    /// Binds to the runtime the caller is currently running on.
    pub fn current() -> Result<Self, TaskError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| TaskError::NoRuntime)
    }

    /// Registers and starts `operation` under `id`, cancelling any task
    /// already registered under that id without waiting for it.
    pub fn run<F, Fut>(&self, id: &str, operation: F) -> TaskHandle
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        let handle = TaskHandle {
            id: Arc::from(id),
            generation,
            token: token.clone(),
            done: done_rx,
        };

        let previous = {
            let mut entries = self.registry.entries.lock();
            let live = entries.live.insert(id.to_string(), handle.clone());
            let stopping = entries.stopping.remove(id);
            live.or(stopping)
        };
        if let Some(previous) = &previous {
            debug!(task_id = id, "cancelling previous run");
            previous.cancel();
        }

        let completion = Completion {
            registry: Arc::clone(&self.registry),
            id: id.to_string(),
            generation,
            done_tx,
            outcome: None,
        };
        self.runtime.spawn(async move {
            let mut completion = completion;
            if let Some(previous) = previous {
                previous.wait().await;
            }
            if token.is_cancelled() {
                drop(operation);
                completion.finish(TaskOutcome::Canceled);
                return;
            }
            operation(token.clone()).await;
            completion.finish(if token.is_cancelled() {
                TaskOutcome::Canceled
            } else {
                TaskOutcome::Finished
            });
        });

        handle
    }

    /// Requests cancellation of the task under `id`. No-op when absent.
    pub fn cancel(&self, id: &str) {
        if let Some(handle) = self.registry.entries.lock().live.get(id) {
            handle.cancel();
        }
    }

    /// Cancels the task under `id` and waits until it has actually stopped.
    /// Returns `None` when nothing was registered.
    pub async fn cancel_and_await(&self, id: &str) -> Option<TaskOutcome> {
        let handle = self.handle(id)?;
        handle.cancel();
        Some(handle.wait().await)
    }

    /// Cancels every registered task and empties the registry. Tasks that are
    /// still winding down are kept aside so a new run under the same id
    /// waits for them.
    pub fn cancel_all(&self) {
        let mut entries = self.registry.entries.lock();
        let drained: Vec<(String, TaskHandle)> = entries.live.drain().collect();
        for (id, handle) in drained {
            handle.cancel();
            entries.stopping.insert(id, handle);
        }
    }

    pub fn handle(&self, id: &str) -> Option<TaskHandle> {
        self.registry.entries.lock().live.get(id).cloned()
    }

    /// Waits for the task currently registered under `id`, if any.
    pub async fn wait(&self, id: &str) -> Option<TaskOutcome> {
        let handle = self.handle(id)?;
        Some(handle.wait().await)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.registry.entries.lock().live.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registry.entries.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.entries.lock().live.is_empty()
    }
}

/// Settles a task exactly once: drops its registry entry (unless a newer
/// task took the id over) and resolves its completion. Runs on drop so a
/// panicking or aborted task still settles as cancelled.
struct Completion {
    registry: Arc<Registry>,
    id: String,
    generation: u64,
    done_tx: watch::Sender<Option<TaskOutcome>>,
    outcome: Option<TaskOutcome>,
}

impl Completion {
    fn finish(&mut self, outcome: TaskOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or(TaskOutcome::Canceled);
        {
            let mut guard = self.registry.entries.lock();
            let entries = &mut *guard;
            for map in [&mut entries.live, &mut entries.stopping] {
                let owns_entry = map
                    .get(&self.id)
                    .is_some_and(|handle| handle.generation == self.generation);
                if owns_entry {
                    map.remove(&self.id);
                }
            }
        }
        self.done_tx.send_replace(Some(outcome));
        debug!(task_id = %self.id, ?outcome, "task settled");
    }
}
