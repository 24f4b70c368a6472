//! The dispatcher: admission, the dispatch loop, and cancellation.
//!
//! Adapters call [`Dispatcher::submit`]. A single loop wakes every
//! `tick_interval`, admits at most one queued event per conversation whose
//! gate has a free slot, and hands it to the execution pool. Every admitted
//! event carries a [`CompletionGuard`] that gives the slot back when the job
//! ends, however it ends.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use {
    parley_common::types::{ConversationId, Event, Priority, now_ms},
    parley_config::DispatchConfig,
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, gauge, histogram, labels};

use crate::{
    error::{Error, Result},
    handle::Handle,
    pipeline::{Outcome, Pipeline, RetryPolicy},
    pool::ExecutionPool,
    registry::{ConversationRegistry, ConversationState},
};

/// What a cancellation removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// Queued events dropped before they were ever admitted.
    pub discarded_events: usize,
    /// Admitted handles stopped before they started running.
    pub cancelled_handles: usize,
}

impl CancelReport {
    pub fn is_empty(&self) -> bool {
        self.discarded_events == 0 && self.cancelled_handles == 0
    }
}

impl std::ops::AddAssign for CancelReport {
    fn add_assign(&mut self, other: Self) {
        self.discarded_events += other.discarded_events;
        self.cancelled_handles += other.cancelled_handles;
    }
}

struct Inner {
    registry: ConversationRegistry,
    pool: ExecutionPool,
    pipeline: Pipeline,
    tick_interval: Duration,
    accounting_violations: AtomicUsize,
}

pub struct Dispatcher {
    inner: Arc<Inner>,
    stop: CancellationToken,
    dispatch_loop: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Build a dispatcher; send retries follow `config`.
    pub fn new(config: &DispatchConfig, pipeline: Pipeline) -> Result<Self> {
        if config.concurrency_in_session == 0 {
            return Err(Error::invalid_config("concurrency_in_session must be at least 1"));
        }
        if config.pool_workers == 0 {
            return Err(Error::invalid_config("pool_workers must be at least 1"));
        }
        if config.tick_interval_ms == 0 {
            return Err(Error::invalid_config("tick_interval_ms must be greater than 0"));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                registry: ConversationRegistry::new(config.concurrency_in_session),
                pool: ExecutionPool::new(config.pool_workers),
                pipeline: pipeline.with_retry(RetryPolicy::from(config)),
                tick_interval: config.tick_interval(),
                accounting_violations: AtomicUsize::new(0),
            }),
            stop: CancellationToken::new(),
            dispatch_loop: std::sync::Mutex::new(None),
        })
    }

    /// Start the pool workers and the dispatch loop on the current runtime.
    pub fn start(&self) {
        let mut slot = self.dispatch_loop.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() || self.stop.is_cancelled() {
            return;
        }
        self.inner.pool.start();

        let inner = Arc::clone(&self.inner);
        let stop = self.stop.clone();
        *slot = Some(tokio::spawn(async move {
            info!(
                tick_ms = inner.tick_interval.as_millis() as u64,
                workers = inner.pool.size(),
                capacity = inner.registry.capacity(),
                "dispatch loop started"
            );
            let mut ticker = tokio::time::interval(inner.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        inner.tick();
                    },
                }
            }
            info!("dispatch loop stopped");
        }));
    }

    /// Queue an event. Never blocks; fails only on a malformed event.
    pub fn submit(&self, conversation_id: &ConversationId, event: Event) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(self.inner.reject(conversation_id, "empty conversation id"));
        }
        if event.conversation_id != *conversation_id {
            return Err(self.inner.reject(
                conversation_id,
                format!("event belongs to conversation {}", event.conversation_id),
            ));
        }
        if let Some(defect) = event.payload.defect() {
            return Err(self.inner.reject(conversation_id, defect));
        }
        self.inner.enqueue(event);
        Ok(())
    }

    /// Discard queued events of one conversation and cancel its handles that
    /// have not started. Running work is left to finish.
    pub fn cancel_session(&self, conversation_id: &ConversationId) -> CancelReport {
        let report = self.inner.cancel_session(conversation_id);
        if !report.is_empty() {
            info!(
                conversation_id = %conversation_id,
                discarded = report.discarded_events,
                cancelled = report.cancelled_handles,
                "conversation cancelled"
            );
        }
        report
    }

    /// [`cancel_session`](Self::cancel_session) for every live conversation.
    pub fn cancel_all(&self) -> CancelReport {
        let mut total = CancelReport::default();
        for id in self.inner.registry.ids() {
            total += self.inner.cancel_session(&id);
        }
        if !total.is_empty() {
            info!(
                discarded = total.discarded_events,
                cancelled = total.cancelled_handles,
                "all conversations cancelled"
            );
        }
        total
    }

    /// Cancel everything, stop the loop, and wait for running work to end.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.stop.cancel();
        let dispatch_loop = self
            .dispatch_loop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = dispatch_loop {
            if let Err(e) = task.await {
                error!(error = %e, "dispatch loop task failed");
            }
        }
        self.inner.pool.close().await;
        info!(
            live_conversations = self.inner.registry.len(),
            "dispatcher shut down"
        );
    }

    /// Run one dispatch sweep now. Returns the number of events admitted.
    pub fn dispatch_once(&self) -> usize {
        self.inner.tick()
    }

    pub fn queue_depth(&self, conversation_id: &ConversationId) -> usize {
        self.inner
            .registry
            .with_state(conversation_id, |state| state.queue.len())
            .unwrap_or(0)
    }

    /// Handles admitted for a conversation and not yet released.
    pub fn in_flight(&self, conversation_id: &ConversationId) -> Vec<Handle> {
        self.inner
            .registry
            .with_state(conversation_id, |state| {
                state.in_flight.values().cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn live_conversations(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.inner.registry.contains(conversation_id)
    }

    /// Gate releases that had no matching acquire. Anything but zero is a bug.
    pub fn accounting_violations(&self) -> usize {
        self.inner.accounting_violations.load(Ordering::Acquire)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl Inner {
    fn reject(&self, conversation_id: &ConversationId, reason: impl Into<String>) -> Error {
        let err = Error::invalid_event(reason);
        debug!(conversation_id = %conversation_id, error = %err, "event rejected");
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::EVENTS_REJECTED_TOTAL).increment(1);
        err
    }

    fn enqueue(&self, event: Event) {
        let conversation_id = event.conversation_id.clone();
        let event_id = event.id;
        let priority = event.priority;
        let depth = self.registry.enqueue(event);
        debug!(
            conversation_id = %conversation_id,
            event_id = %event_id,
            priority = priority_label(priority),
            depth,
            "event queued"
        );
        #[cfg(feature = "metrics")]
        counter!(
            dispatch_metrics::EVENTS_SUBMITTED_TOTAL,
            labels::PRIORITY => priority_label(priority)
        )
        .increment(1);
    }

    /// One sweep: admit at most one event per conversation, then reap the
    /// conversations that went idle.
    fn tick(self: &Arc<Self>) -> usize {
        let ids = self.registry.ids();
        let mut admitted = 0;

        for id in &ids {
            let next = self
                .registry
                .with_state(id, |state| {
                    if !state.gate.try_acquire() {
                        return None;
                    }
                    let Some(event) = state.queue.dequeue_front() else {
                        if let Err(e) = state.gate.release() {
                            self.record_violation(&e);
                        }
                        return None;
                    };
                    let handle = Handle::new(event.id, id.clone());
                    state.in_flight.insert(event.id, handle.clone());
                    Some((event, handle))
                })
                .flatten();

            if let Some((event, handle)) = next {
                self.launch(event, handle);
                admitted += 1;
            }
        }

        for id in &ids {
            if self.registry.remove_if_idle(id) {
                debug!(conversation_id = %id, "conversation reaped");
            }
        }

        #[cfg(feature = "metrics")]
        gauge!(dispatch_metrics::CONVERSATIONS_ACTIVE).set(self.registry.len() as f64);

        admitted
    }

    fn launch(self: &Arc<Self>, event: Event, handle: Handle) {
        debug!(
            conversation_id = %event.conversation_id,
            event_id = %event.id,
            "event admitted"
        );
        #[cfg(feature = "metrics")]
        {
            gauge!(dispatch_metrics::IN_FLIGHT).increment(1.0);
            histogram!(dispatch_metrics::QUEUE_WAIT_SECONDS)
                .record(now_ms().saturating_sub(event.received_at_ms) as f64 / 1000.0);
        }

        let mut guard = CompletionGuard {
            inner: Arc::clone(self),
            handle,
            succeeded: None,
        };
        let inner = Arc::clone(self);
        let job = Box::pin(async move {
            let succeeded = inner.execute(event, &guard.handle).await;
            guard.record(succeeded);
        });

        // A rejected job is dropped right here, and its guard with it.
        if let Err(e) = self.pool.submit(job) {
            warn!(error = %e, "execution pool refused event");
        }
    }

    /// Run the pipeline if the handle was not cancelled first. Returns
    /// `None` when it never started.
    async fn execute(self: &Arc<Self>, event: Event, handle: &Handle) -> Option<bool> {
        if !handle.try_start() {
            debug!(
                conversation_id = %event.conversation_id,
                event_id = %event.id,
                "handle cancelled before start"
            );
            return None;
        }

        let started = Instant::now();
        let waited_ms = now_ms().saturating_sub(event.received_at_ms);
        let result = self.pipeline.run(&event).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        #[cfg(feature = "metrics")]
        histogram!(dispatch_metrics::HANDLING_DURATION_SECONDS)
            .record(elapsed_ms as f64 / 1000.0);

        match result {
            Ok(outcome) => {
                debug!(
                    conversation_id = %event.conversation_id,
                    event_id = %event.id,
                    waited_ms,
                    elapsed_ms,
                    outcome = outcome_label(&outcome),
                    "event handled"
                );
                if let Outcome::Redispatch(derived) = outcome {
                    self.enqueue(derived);
                }
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::PIPELINE_COMPLETED_TOTAL).increment(1);
                Some(true)
            },
            Err(e) => {
                warn!(
                    conversation_id = %event.conversation_id,
                    event_id = %event.id,
                    stage = e.stage(),
                    elapsed_ms,
                    error = %e,
                    "event handling failed"
                );
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::PIPELINE_FAILED_TOTAL, labels::STAGE => e.stage())
                    .increment(1);
                Some(false)
            },
        }
    }

    /// Drop the queue and cancel pending handles. A cancelled handle gives
    /// its slot back right here, under the same entry guard, so the gate is
    /// free before anyone can observe the `Cancelled` state through the
    /// registry. Its job, once a worker reaches it, releases nothing.
    fn cancel_session(&self, conversation_id: &ConversationId) -> CancelReport {
        let report = self
            .registry
            .with_state(conversation_id, |state| {
                let discarded_events = state.queue.drain().len();
                let cancelled: Vec<Handle> = state
                    .in_flight
                    .values()
                    .filter(|h| h.cancel())
                    .cloned()
                    .collect();
                for handle in &cancelled {
                    if handle.take_slot() {
                        self.release_in(state, handle);
                    }
                }
                CancelReport {
                    discarded_events,
                    cancelled_handles: cancelled.len(),
                }
            })
            .unwrap_or_default();

        #[cfg(feature = "metrics")]
        {
            counter!(dispatch_metrics::EVENTS_DISCARDED_TOTAL)
                .increment(report.discarded_events as u64);
            counter!(dispatch_metrics::HANDLES_CANCELLED_TOTAL)
                .increment(report.cancelled_handles as u64);
        }
        report
    }

    /// Give back the slot held by `handle` and forget the handle, unless a
    /// cancellation already did.
    fn release(&self, handle: &Handle) {
        if !handle.take_slot() {
            return;
        }
        let conversation_id = handle.conversation_id();
        let released = self
            .registry
            .with_state(conversation_id, |state| self.release_in(state, handle));
        if released.is_none() {
            self.record_violation(&Error::gate_accounting(
                conversation_id.clone(),
                self.registry.capacity(),
            ));
        }
    }

    /// Release under an entry guard the caller already holds. The caller
    /// must have won `take_slot`.
    fn release_in(&self, state: &mut ConversationState, handle: &Handle) {
        if let Err(e) = state.release(handle) {
            self.record_violation(&e);
        }
        #[cfg(feature = "metrics")]
        gauge!(dispatch_metrics::IN_FLIGHT).decrement(1.0);
    }

    fn record_violation(&self, err: &Error) {
        self.accounting_violations.fetch_add(1, Ordering::AcqRel);
        error!(error = %err, "gate accounting violation");
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::GATE_ACCOUNTING_ERRORS_TOTAL).increment(1);
    }
}

fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "high",
        Priority::Normal => "normal",
    }
}

fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Sent { .. } => "sent",
        Outcome::NoReply => "no_reply",
        Outcome::Redispatch(_) => "redispatch",
    }
}

/// Releases the gate slot and removes the handle when a job ends: normally,
/// by panic, or by being dropped unstarted. The handle only reaches its
/// terminal state after the release, so a waiter never sees a finished
/// handle that still holds a slot. A handle cancelled while pending was
/// already released by the cancellation.
struct CompletionGuard {
    inner: Arc<Inner>,
    handle: Handle,
    /// `Some(ok)` once the pipeline ran to completion.
    succeeded: Option<bool>,
}

impl CompletionGuard {
    fn record(&mut self, succeeded: Option<bool>) {
        self.succeeded = succeeded;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.inner.release(&self.handle);
        match self.succeeded {
            Some(ok) => self.handle.finish(ok),
            // Never started: cancel. Started but unwound: failed.
            None => {
                if !self.handle.cancel() {
                    self.handle.finish(false);
                }
            },
        }
    }
}
