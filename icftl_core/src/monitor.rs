//! Online monitor: an ingest queue drained by a dedicated consumer thread.
//!
//! Producers submit events concurrently through [`Monitor::submit`] (or cloned [`Submitter`]s);
//! a single consumer thread owns every binding, so that no binding is ever mutated concurrently.

mod queue;
mod session;

pub use session::Session;

use crate::{
    Event, Timestamp,
    evaluator::ClosurePolicy,
    specification::Specification,
    verdict::{BindingSnapshot, VerdictSink},
};
use log::{info, warn};
use queue::{IngestQueue, Message};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;

/// What to do when an event is submitted to a full ingest queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait for room, up to the given timeout, then drop the event.
    Block {
        /// Maximum waiting time.
        timeout: Duration,
    },
    /// Drop the event immediately.
    Drop,
}

/// Configuration of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Maximum number of events waiting to be processed.
    pub capacity: usize,
    /// Policy for submissions to a full queue.
    pub backpressure: Backpressure,
    /// What undecided formulae become when a scope closes.
    pub closure: ClosurePolicy,
    /// Update the bindings of different specifications in parallel.
    pub parallel: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            backpressure: Backpressure::Block {
                timeout: Duration::from_secs(1),
            },
            closure: ClosurePolicy::default(),
            parallel: false,
        }
    }
}

/// Aggregate counters of a monitoring session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Events processed.
    pub events: u64,
    /// Events at program points no specification observes.
    pub unknown_points: u64,
    /// Events arriving with a timestamp smaller than an earlier event of the same context.
    pub reordered: u64,
    /// Event values dropped because of their type.
    pub type_mismatches: u64,
    /// Events for nested per-occurrence quantifiers with no open occurrence.
    pub orphans: u64,
    /// Events dropped because of backpressure.
    pub dropped: u64,
    /// Verdicts `true`.
    pub verdicts_true: u64,
    /// Verdicts `false`.
    pub verdicts_false: u64,
    /// Inconclusive verdicts.
    pub inconclusive: u64,
}

impl MonitorStats {
    /// Total number of verdicts.
    pub fn verdicts(&self) -> u64 {
        self.verdicts_true + self.verdicts_false + self.inconclusive
    }
}

/// Errors of the [`Monitor`] lifecycle.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The ingest queue is full: the event has been dropped (and counted).
    #[error("ingest queue full, event at timestamp {timestamp} dropped")]
    Backpressure {
        /// Timestamp of the dropped event.
        timestamp: Timestamp,
    },
    /// The monitor has been stopped.
    #[error("monitor stopped")]
    Stopped,
    /// The consumer thread could not be spawned.
    #[error("failed to spawn consumer thread")]
    Spawn(#[source] std::io::Error),
    /// The consumer thread panicked.
    #[error("consumer thread panicked")]
    ConsumerPanicked,
}

/// Cloneable handle to submit events to a running [`Monitor`] from any thread.
#[derive(Clone)]
pub struct Submitter {
    queue: Arc<IngestQueue>,
    backpressure: Backpressure,
}

impl Submitter {
    /// Enqueues an event, see [`Monitor::submit`].
    pub fn submit(&self, event: impl Into<Arc<Event>>) -> Result<(), MonitorError> {
        self.queue.push(event.into(), self.backpressure)
    }
}

/// An online monitor running on its own consumer thread.
///
/// Dropping the monitor stops it.
pub struct Monitor {
    queue: Arc<IngestQueue>,
    backpressure: Backpressure,
    consumer: Mutex<Option<JoinHandle<MonitorStats>>>,
    stats: Mutex<Option<MonitorStats>>,
    processed: Arc<AtomicU64>,
    verdicts: Arc<AtomicU64>,
}

impl Monitor {
    /// Starts monitoring the given specifications, reporting verdicts to the sink.
    pub fn start<S>(
        specifications: impl IntoIterator<Item = Specification>,
        config: MonitorConfig,
        sink: S,
    ) -> Result<Self, MonitorError>
    where
        S: VerdictSink + 'static,
    {
        let queue = Arc::new(IngestQueue::new(config.capacity));
        let session = Session::new(specifications, config.closure).with_parallel(config.parallel);
        let processed = Arc::new(AtomicU64::new(0));
        let verdicts = Arc::new(AtomicU64::new(0));
        let consumer = thread::Builder::new()
            .name("icftl-monitor".to_owned())
            .spawn({
                let queue = Arc::clone(&queue);
                let processed = Arc::clone(&processed);
                let verdicts = Arc::clone(&verdicts);
                move || consume(&queue, session, sink, &processed, &verdicts)
            })
            .map_err(MonitorError::Spawn)?;
        info!("monitor started");
        Ok(Self {
            queue,
            backpressure: config.backpressure,
            consumer: Mutex::new(Some(consumer)),
            stats: Mutex::new(None),
            processed,
            verdicts,
        })
    }

    /// Enqueues an event.
    ///
    /// If the queue is full, blocks or drops the event according to the configured [`Backpressure`].
    /// Events submitted from the same thread are processed in submission order.
    pub fn submit(&self, event: impl Into<Arc<Event>>) -> Result<(), MonitorError> {
        self.queue.push(event.into(), self.backpressure)
    }

    /// A handle to submit events from other threads.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            queue: Arc::clone(&self.queue),
            backpressure: self.backpressure,
        }
    }

    /// The state of every open binding, after all events submitted before the call are processed.
    pub fn snapshot(&self) -> Result<Vec<BindingSnapshot>, MonitorError> {
        let (reply, snapshot) = mpsc::channel();
        self.queue.push_control(Message::Snapshot(reply))?;
        snapshot.recv().map_err(|_| MonitorError::ConsumerPanicked)
    }

    /// Whether the consumer thread is still running.
    pub fn running(&self) -> bool {
        self.consumer
            .lock()
            .expect("lock")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of events processed so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Number of verdicts issued so far.
    pub fn verdicts(&self) -> u64 {
        self.verdicts.load(Ordering::Relaxed)
    }

    /// Number of events dropped so far because of backpressure.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Stops the monitor: processes every event already accepted,
    /// closes every scope and hands the final statistics to the sink.
    ///
    /// Calling `stop` again returns the same statistics.
    pub fn stop(&self) -> Result<MonitorStats, MonitorError> {
        let mut consumer = self.consumer.lock().expect("lock");
        self.queue.close();
        if let Some(handle) = consumer.take() {
            let stats = handle
                .join()
                .map_err(|_| MonitorError::ConsumerPanicked)?;
            *self.stats.lock().expect("lock") = Some(stats);
        }
        self.stats
            .lock()
            .expect("lock")
            .ok_or(MonitorError::ConsumerPanicked)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("monitor did not stop cleanly: {err}");
        }
    }
}

fn consume<S: VerdictSink>(
    queue: &IngestQueue,
    mut session: Session,
    mut sink: S,
    processed: &AtomicU64,
    verdicts: &AtomicU64,
) -> MonitorStats {
    let start_time = Instant::now();
    loop {
        match queue.pop() {
            Message::Event(event) => {
                let decided = session.process(event);
                processed.fetch_add(1, Ordering::Relaxed);
                verdicts.fetch_add(decided.len() as u64, Ordering::Relaxed);
                decided.into_iter().for_each(|verdict| sink.verdict(verdict));
            }
            Message::Snapshot(reply) => {
                // The requester may have given up.
                let _ = reply.send(session.snapshot());
            }
            Message::Stop => break,
        }
    }
    let decided = session.close();
    verdicts.fetch_add(decided.len() as u64, Ordering::Relaxed);
    decided.into_iter().for_each(|verdict| sink.verdict(verdict));
    let mut stats = session.stats();
    stats.dropped = queue.dropped();
    if stats.dropped > 0 {
        warn!("{} events dropped because of backpressure", stats.dropped);
    }
    sink.finalize(&stats);
    let elapsed = start_time.elapsed();
    info!("monitoring time elapsed: {elapsed:0.2?}");
    info!("monitor terminating");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CmpOp, Outcome, RawFormula, RawOperand, RawQuantifier, RawSpecification, Type, Val,
        VerdictLog, compile,
    };

    fn positive() -> Specification {
        compile(
            RawSpecification::new("positive")
                .forall(
                    RawQuantifier::new("x", "enter(f)")
                        .field("value", Type::Integer)
                        .until("exit(f)"),
                )
                .check(RawFormula::Compare(
                    CmpOp::Gt,
                    RawOperand::Field("x".into(), "value".into()),
                    RawOperand::Literal(Val::Integer(0)),
                )),
        )
        .expect("compile")
    }

    #[test]
    fn lifecycle() {
        let log = VerdictLog::new();
        let monitor =
            Monitor::start([positive()], MonitorConfig::default(), log.clone()).expect("start");
        assert!(monitor.running());
        monitor
            .submit(Event::new(1, "enter(f)", 1).with_value("value", 5i64))
            .expect("submit");
        monitor.submit(Event::new(2, "enter(f)", 2)).expect("submit");
        let snapshot = monitor.snapshot().expect("snapshot");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(monitor.processed(), 2);

        let stats = monitor.stop().expect("stop");
        assert!(!monitor.running());
        assert_eq!(stats.events, 2);
        assert_eq!(stats.verdicts_true, 1);
        assert_eq!(stats.inconclusive, 1);
        assert_eq!(log.stats(), Some(stats));
        let outcomes: Vec<_> = log.verdicts().iter().map(|v| v.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::True, Outcome::Inconclusive]);

        assert_eq!(monitor.stop().expect("stop again"), stats);
        assert!(matches!(
            monitor.submit(Event::new(3, "enter(f)", 1)),
            Err(MonitorError::Stopped)
        ));
        assert!(matches!(monitor.snapshot(), Err(MonitorError::Stopped)));
    }

    #[test]
    fn concurrent_producers() {
        let (sender, receiver) = mpsc::channel();
        let monitor = Monitor::start([positive()], MonitorConfig::default(), sender).expect("start");
        let handles: Vec<_> = (0..4u64)
            .map(|ctx| {
                let submitter = monitor.submitter();
                thread::spawn(move || {
                    for i in 0..10u64 {
                        let ts = ctx * 100 + 2 * i;
                        submitter
                            .submit(Event::new(ts, "enter(f)", ctx).with_value("value", i as i64))
                            .expect("submit");
                        submitter
                            .submit(Event::new(ts + 1, "exit(f)", ctx))
                            .expect("submit");
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .for_each(|h| h.join().expect("producer"));
        let stats = monitor.stop().expect("stop");
        assert_eq!(stats.events, 80);
        // One binding per (context, call): value 0 is the only violation.
        assert_eq!(stats.verdicts_true, 36);
        assert_eq!(stats.verdicts_false, 4);
        assert_eq!(receiver.iter().count(), 40);
    }
}
