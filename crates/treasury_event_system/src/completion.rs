//! Manually signalled completion tokens.
//!
//! A [`Completion`] is a one-shot success/error signal that is independent of
//! any particular runtime: it can be completed from any thread, observed with
//! callbacks, awaited, or waited on synchronously. [`FireCompletion`] carries
//! the fired event back to whoever fired it.

use crate::error::{EventError, FireError};
use crate::subscriber::panic_message;
use futures::channel::oneshot;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

type Outcome<T> = Result<Arc<T>, Arc<[EventError]>>;
type Callback<T> = Box<dyn FnOnce(Result<&T, &[EventError]>) + Send>;

fn view<T>(outcome: &Outcome<T>) -> Result<&T, &[EventError]> {
    match outcome {
        Ok(value) => Ok(value.as_ref()),
        Err(errors) => Err(errors.as_ref()),
    }
}

fn outcome_from<T>(value: T, errors: Vec<EventError>) -> Outcome<T> {
    if errors.is_empty() {
        Ok(Arc::new(value))
    } else {
        Err(Arc::from(errors))
    }
}

struct State<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
    watchers: Vec<oneshot::Sender<()>>,
    /// Set once every callback registered before completion has run.
    settled: bool,
}

/// Shared one-shot cell behind both completion kinds.
struct Signal<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T> Signal<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                outcome: None,
                callbacks: Vec::new(),
                watchers: Vec::new(),
                settled: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Outcome<T>) -> Result<(), EventError> {
        let callbacks = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return Err(EventError::AlreadyCompleted);
            }
            state.outcome = Some(outcome.clone());
            self.changed.notify_all();
            std::mem::take(&mut state.callbacks)
        };

        // Callbacks run without the lock so they may register further callbacks.
        // A panicking callback must not keep waiters from being released.
        for callback in callbacks {
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(view(&outcome))));
            if let Err(payload) = result {
                error!(
                    "💥 Completion callback panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
        drop(outcome);

        let watchers = {
            let mut state = self.lock();
            state.settled = true;
            self.changed.notify_all();
            std::mem::take(&mut state.watchers)
        };
        for watcher in watchers {
            let _ = watcher.send(());
        }
        Ok(())
    }

    fn on_complete(&self, callback: Callback<T>) {
        let ready = {
            let mut state = self.lock();
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.callbacks.push(callback);
                    return;
                }
            }
        };
        callback(view(&ready));
    }

    fn is_done(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Blocks until an outcome exists and returns a handle to it.
    fn wait_outcome(&self) -> Outcome<T> {
        let mut state = self.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until every pre-registered callback has run, then takes the outcome.
    fn wait_and_take(&self) -> Option<Outcome<T>> {
        let mut state = self.lock();
        while !state.settled {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.outcome.take()
    }

    /// Returns a receiver that fires once settled, or `None` if already settled.
    fn watch(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.lock();
        if state.settled {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        state.watchers.push(sender);
        Some(receiver)
    }
}

/// A manually signalled, clonable success/error token.
///
/// Exactly one `complete*` call succeeds; every clone observes the same
/// outcome. The error list is empty on success.
#[derive(Clone)]
pub struct Completion {
    signal: Arc<Signal<()>>,
}

impl Completion {
    /// Creates a pending completion.
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
        }
    }

    /// Creates a completion that has already succeeded.
    pub fn completed() -> Self {
        let completion = Self::new();
        let _ = completion.settle(Vec::new());
        completion
    }

    /// Creates a completion that has already failed with `error`.
    pub fn completed_exceptionally(error: EventError) -> Self {
        let completion = Self::new();
        let _ = completion.settle(vec![error]);
        completion
    }

    /// Completes successfully.
    ///
    /// Callbacks registered with [`when_complete`](Self::when_complete) run on
    /// this thread before it returns.
    ///
    /// # Returns
    ///
    /// `Err(EventError::AlreadyCompleted)` if any clone of this completion was
    /// already completed; the earlier outcome is kept.
    pub fn complete(&self) -> Result<(), EventError> {
        self.settle(Vec::new())
    }

    /// Completes with `error`. Fails like [`complete`](Self::complete) if
    /// already completed.
    pub fn complete_exceptionally(&self, error: EventError) -> Result<(), EventError> {
        self.settle(vec![error])
    }

    pub(crate) fn settle(&self, errors: Vec<EventError>) -> Result<(), EventError> {
        self.signal.settle(outcome_from((), errors))
    }

    /// Joins `completions` into one that completes once all of them have.
    ///
    /// The joined error list concatenates the inputs' errors in input order,
    /// regardless of the order in which the inputs complete.
    ///
    /// # Example
    ///
    /// ```rust
    /// use treasury_event_system::{Completion, EventError};
    ///
    /// let first = Completion::new();
    /// let second = Completion::new();
    /// let joined = Completion::join([first.clone(), second.clone()]);
    ///
    /// second.complete_exceptionally(EventError::handler("declined")).unwrap();
    /// assert!(!joined.is_done());
    /// first.complete().unwrap();
    /// assert_eq!(joined.wait(), vec![EventError::handler("declined")]);
    /// ```
    pub fn join<I>(completions: I) -> Completion
    where
        I: IntoIterator<Item = Completion>,
    {
        let completions: Vec<Completion> = completions.into_iter().collect();
        if completions.is_empty() {
            return Completion::completed();
        }

        let joined = Completion::new();
        let slots: Arc<Mutex<Vec<Option<Vec<EventError>>>>> =
            Arc::new(Mutex::new(vec![None; completions.len()]));
        let remaining = Arc::new(AtomicUsize::new(completions.len()));

        for (index, completion) in completions.iter().enumerate() {
            let joined = joined.clone();
            let slots = Arc::clone(&slots);
            let remaining = Arc::clone(&remaining);
            completion.when_complete(move |errors| {
                let mut guard = slots.lock().unwrap_or_else(PoisonError::into_inner);
                guard[index] = Some(errors.to_vec());
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let errors: Vec<EventError> =
                        std::mem::take(&mut *guard).into_iter().flatten().flatten().collect();
                    drop(guard);
                    if let Err(e) = joined.settle(errors) {
                        debug!("Joined completion settled twice: {}", e);
                    }
                }
            });
        }

        joined
    }

    /// Registers `callback` to run with the error list once complete.
    ///
    /// Runs on the completing thread, or immediately on this thread if the
    /// completion is already done.
    pub fn when_complete<F>(&self, callback: F)
    where
        F: FnOnce(&[EventError]) + Send + 'static,
    {
        self.signal
            .on_complete(Box::new(move |outcome: Result<&(), &[EventError]>| {
                callback(outcome.err().unwrap_or(&[]))
            }));
    }

    /// Blocks this thread until complete, then runs `callback` on it.
    pub fn when_complete_blocking<F, R>(&self, callback: F) -> R
    where
        F: FnOnce(&[EventError]) -> R,
    {
        let outcome = self.signal.wait_outcome();
        callback(view(&outcome).err().unwrap_or(&[]))
    }

    /// Blocks until complete and returns the errors (empty on success).
    pub fn wait(&self) -> Vec<EventError> {
        self.when_complete_blocking(|errors| errors.to_vec())
    }

    /// Waits asynchronously and returns the errors (empty on success).
    ///
    /// Resolves once every callback registered before completion has run.
    ///
    /// # Example
    ///
    /// ```rust
    /// use treasury_event_system::Completion;
    ///
    /// # futures::executor::block_on(async {
    /// let completion = Completion::new();
    /// let remote = completion.clone();
    /// std::thread::spawn(move || remote.complete());
    /// assert!(completion.settled().await.is_empty());
    /// # });
    /// ```
    pub async fn settled(&self) -> Vec<EventError> {
        if let Some(receiver) = self.signal.watch() {
            let _ = receiver.await;
        }
        self.wait()
    }

    pub fn is_done(&self) -> bool {
        self.signal.is_done()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Completion of a single [`EventBus::fire`](crate::EventBus::fire).
///
/// Succeeds with the (possibly mutated) event, or fails with every error the
/// subscribers reported. Owned by whoever fired the event.
pub struct FireCompletion<E> {
    signal: Arc<Signal<E>>,
}

/// Write side of a [`FireCompletion`]. Dropping it unsettled fails the fire.
pub(crate) struct FireCompleter<E> {
    signal: Arc<Signal<E>>,
    event_type: &'static str,
    settled: bool,
}

pub(crate) fn fire_channel<E>() -> (FireCompleter<E>, FireCompletion<E>) {
    let signal = Arc::new(Signal::new());
    (
        FireCompleter {
            signal: Arc::clone(&signal),
            event_type: std::any::type_name::<E>(),
            settled: false,
        },
        FireCompletion { signal },
    )
}

impl<E> FireCompleter<E> {
    pub(crate) fn complete(mut self, event: E) {
        self.settled = true;
        let _ = self.signal.settle(Ok(Arc::new(event)));
    }

    pub(crate) fn fail(mut self, errors: Vec<EventError>) {
        self.settled = true;
        let _ = self.signal.settle(Err(Arc::from(errors)));
    }
}

impl<E> Drop for FireCompleter<E> {
    fn drop(&mut self) {
        if !self.settled {
            let _ = self.signal.settle(Err(Arc::from(vec![
                EventError::ExecutorUnavailable(self.event_type.to_string()),
            ])));
        }
    }
}

impl<E> FireCompletion<E> {
    /// A fire that completed immediately with `event`.
    pub(crate) fn ready(event: E) -> Self {
        let (completer, completion) = fire_channel();
        completer.complete(event);
        completion
    }

    /// A fire that failed before dispatch.
    pub(crate) fn failed(errors: Vec<EventError>) -> Self {
        let (completer, completion) = fire_channel();
        completer.fail(errors);
        completion
    }

    /// Registers `callback` to observe the outcome without blocking.
    pub fn when_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<&E, &[EventError]>) + Send + 'static,
    {
        self.signal.on_complete(Box::new(callback));
    }

    /// Blocks this thread until the fire completes, then runs `callback` on it.
    pub fn when_complete_blocking<F, R>(&self, callback: F) -> R
    where
        F: FnOnce(Result<&E, &[EventError]>) -> R,
    {
        let outcome = self.signal.wait_outcome();
        callback(view(&outcome))
    }

    /// Blocks until complete and hands the event back.
    pub fn wait(self) -> Result<E, FireError> {
        let outcome = self
            .signal
            .wait_and_take()
            .ok_or_else(|| FireError::new(vec![EventError::OutcomeTaken]))?;
        unwrap_outcome(outcome)
    }

    /// Waits asynchronously and hands the event back.
    pub async fn completed(self) -> Result<E, FireError> {
        if let Some(receiver) = self.signal.watch() {
            let _ = receiver.await;
        }
        self.wait()
    }

    pub fn is_done(&self) -> bool {
        self.signal.is_done()
    }

    /// An untyped completion that mirrors this fire's errors.
    pub fn to_completion(&self) -> Completion {
        let completion = Completion::new();
        let mirror = completion.clone();
        self.when_complete(move |outcome| {
            let errors = outcome.err().map(<[EventError]>::to_vec).unwrap_or_default();
            let _ = mirror.settle(errors);
        });
        completion
    }
}

fn unwrap_outcome<E>(outcome: Outcome<E>) -> Result<E, FireError> {
    match outcome {
        Ok(event) => Arc::try_unwrap(event)
            .map_err(|_| FireError::new(vec![EventError::OutcomeTaken])),
        Err(errors) => Err(FireError::new(errors.to_vec())),
    }
}

impl<E> fmt::Debug for FireCompletion<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FireCompletion")
            .field("event_type", &std::any::type_name::<E>())
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn completes_exactly_once() {
        let completion = Completion::new();
        assert!(!completion.is_done());
        assert!(completion.complete().is_ok());
        assert_eq!(completion.complete(), Err(EventError::AlreadyCompleted));
        assert_eq!(
            completion.complete_exceptionally(EventError::handler("late")),
            Err(EventError::AlreadyCompleted)
        );
        assert!(completion.wait().is_empty());
    }

    #[test]
    fn callback_registered_after_completion_runs_immediately() {
        let completion = Completion::completed_exceptionally(EventError::handler("boom"));
        let (tx, rx) = mpsc::channel();
        completion.when_complete(move |errors| {
            tx.send(errors.to_vec()).unwrap();
        });
        assert_eq!(rx.try_recv().unwrap(), vec![EventError::handler("boom")]);
    }

    #[test]
    fn join_of_nothing_is_complete() {
        let joined = Completion::join(Vec::new());
        assert!(joined.is_done());
        assert!(joined.wait().is_empty());
    }

    #[test]
    fn join_waits_for_every_input_and_keeps_input_order() {
        let first = Completion::new();
        let second = Completion::new();
        let third = Completion::new();
        let joined = Completion::join([first.clone(), second.clone(), third.clone()]);

        third
            .complete_exceptionally(EventError::handler("third"))
            .unwrap();
        assert!(!joined.is_done());
        first
            .complete_exceptionally(EventError::handler("first"))
            .unwrap();
        assert!(!joined.is_done());

        let late = second.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            late.complete().unwrap();
        });

        let errors = joined.wait();
        worker.join().unwrap();
        assert_eq!(
            errors,
            vec![EventError::handler("first"), EventError::handler("third")]
        );
    }

    #[test]
    fn blocking_callback_runs_on_calling_thread() {
        let completion = Completion::new();
        let remote = completion.clone();
        let caller = thread::current().id();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.complete().unwrap();
        });

        let ran_on = completion.when_complete_blocking(|errors| {
            assert!(errors.is_empty());
            thread::current().id()
        });
        worker.join().unwrap();
        assert_eq!(ran_on, caller);
    }

    #[test]
    fn fire_completion_returns_event() {
        let (completer, completion) = fire_channel::<String>();
        let (tx, rx) = mpsc::channel();
        completion.when_complete(move |outcome| {
            tx.send(outcome.map(|s| s.clone()).map_err(|e| e.to_vec()))
                .unwrap();
        });
        completer.complete("paid".to_string());

        assert_eq!(rx.recv().unwrap(), Ok("paid".to_string()));
        assert_eq!(completion.wait().unwrap(), "paid");
    }

    #[test]
    fn dropped_completer_fails_the_fire() {
        let (completer, completion) = fire_channel::<u32>();
        drop(completer);
        let error = completion.wait().unwrap_err();
        assert!(matches!(
            error.errors(),
            [EventError::ExecutorUnavailable(_)]
        ));
    }

    #[test]
    fn fire_completion_mirrors_into_completion() {
        let failed = FireCompletion::<u8>::failed(vec![EventError::BusShutdown]);
        assert_eq!(failed.to_completion().wait(), vec![EventError::BusShutdown]);

        let ready = FireCompletion::ready(7u8);
        assert!(ready.to_completion().wait().is_empty());
        assert_eq!(ready.wait().unwrap(), 7);
    }

    #[test]
    fn panicking_callback_still_releases_waiters() {
        let (completer, completion) = fire_channel::<u32>();
        let (tx, rx) = mpsc::channel();
        completion.when_complete(|_| panic!("observer failed"));
        completion.when_complete(move |outcome| {
            tx.send(outcome.copied().is_ok()).unwrap();
        });

        let waiter = thread::spawn(move || completion.wait());
        completer.complete(11);

        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert_eq!(waiter.join().unwrap().unwrap(), 11);
    }

    #[tokio::test]
    async fn completion_can_be_awaited() {
        let completion = Completion::new();
        let remote = completion.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote
                .complete_exceptionally(EventError::Custom("async".into()))
                .unwrap();
        });

        assert_eq!(
            completion.settled().await,
            vec![EventError::Custom("async".into())]
        );
    }
}
