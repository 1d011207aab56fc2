//! Friend-type resolution and per-type executors.

use crate::caller::Callers;
use crate::error::EventError;
use crate::event::{Declared, EventKey, Hierarchy, Supertype, Supertypes};
use crate::subscriber::panic_message;
use crossbeam::channel::{self, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Resolves which ancestors of a fired event currently have subscribers.
///
/// The declared ancestor list of each concrete type is computed once and
/// memoised. Filtering that list against the live subscriptions happens on
/// every call, so an ancestor subscribed after earlier fires is still seen.
#[derive(Default)]
pub struct EventTypeTracker {
    declared: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl EventTypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn declared<E: Hierarchy>(&self) -> Arc<Declared<E>> {
        let id = TypeId::of::<E>();
        let existing = self.declared.get(&id).map(|found| found.value().clone());
        let erased = match existing {
            Some(found) => found,
            None => self
                .declared
                .entry(id)
                .or_insert_with(|| {
                    Arc::new(Supertypes::<E>::declare()) as Arc<dyn Any + Send + Sync>
                })
                .value()
                .clone(),
        };
        erased
            .downcast::<Declared<E>>()
            .unwrap_or_else(|_| Arc::new(Supertypes::<E>::declare()))
    }

    /// Declared ancestors of `E` that currently have at least one subscriber.
    pub(crate) fn friends_of<E: Hierarchy>(&self, callers: &Callers) -> Vec<Supertype<E>> {
        self.declared::<E>()
            .supertypes
            .iter()
            .filter(|supertype| callers.has_subscribers(&supertype.key().id()))
            .cloned()
            .collect()
    }

    /// Number of concrete types whose ancestors have been resolved.
    pub fn tracked_types(&self) -> usize {
        self.declared.len()
    }
}

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// A single worker thread draining a FIFO job queue.
pub(crate) struct SerialExecutor {
    name: String,
    sender: RwLock<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialExecutor {
    fn spawn(name: String) -> Result<Self, EventError> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let thread_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for job in receiver.iter() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        error!(
                            "💥 Dispatch job on {} panicked: {}",
                            thread_name,
                            panic_message(payload.as_ref())
                        );
                    }
                }
                trace!("Executor {} drained", thread_name);
            })
            .map_err(|e| EventError::ExecutorUnavailable(format!("{name}: {e}")))?;

        Ok(Self {
            name,
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues `job` behind every job submitted before it.
    pub(crate) fn execute(&self, job: Job) -> Result<(), EventError> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender
                .send(job)
                .map_err(|_| EventError::ExecutorUnavailable(self.name.clone())),
            None => Err(EventError::ExecutorUnavailable(self.name.clone())),
        }
    }

    /// Stops accepting jobs; queued jobs still run before the thread exits.
    fn close(&self) -> Option<JoinHandle<()>> {
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Hands out one serial executor per concrete event type.
///
/// Fires of the same type are processed in submission order; different
/// types progress independently.
pub struct EventExecutorTracker {
    thread_prefix: String,
    executors: DashMap<TypeId, Arc<SerialExecutor>>,
    closed: AtomicBool,
}

impl EventExecutorTracker {
    pub fn new(thread_prefix: impl Into<String>) -> Self {
        Self {
            thread_prefix: thread_prefix.into(),
            executors: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn executor_for(&self, key: EventKey) -> Result<Arc<SerialExecutor>, EventError> {
        if let Some(executor) = self.executors.get(&key.id()) {
            return Ok(Arc::clone(executor.value()));
        }

        match self.executors.entry(key.id()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                if self.closed.load(Ordering::Acquire) {
                    return Err(EventError::BusShutdown);
                }
                let name = format!("{}-{}", self.thread_prefix, key.short_name());
                let executor = Arc::new(SerialExecutor::spawn(name)?);
                debug!("🧵 Started executor {} for {}", executor.name, key);
                entry.insert(Arc::clone(&executor));
                Ok(executor)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Closes every executor and joins its thread, waiting at most `timeout`
    /// in total. Returns how many threads finished in time.
    pub fn shutdown(&self, timeout: Duration) -> usize {
        self.closed.store(true, Ordering::Release);

        let ids: Vec<TypeId> = self.executors.iter().map(|entry| *entry.key()).collect();
        let workers: Vec<(String, JoinHandle<()>)> = ids
            .iter()
            .filter_map(|id| self.executors.remove(id))
            .filter_map(|(_, executor)| {
                executor
                    .close()
                    .map(|handle| (executor.name.clone(), handle))
            })
            .collect();

        let deadline = Instant::now() + timeout;
        let current = thread::current().id();
        let mut joined = 0;
        for (name, handle) in workers {
            if handle.thread().id() == current {
                // Shutdown requested from inside a subscriber on this executor.
                continue;
            }
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(2));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("⚠️ Executor {} exited with a panic", name);
                }
                joined += 1;
            } else {
                warn!("⚠️ Executor {} did not drain before the shutdown timeout", name);
            }
        }
        joined
    }
}
