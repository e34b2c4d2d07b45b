use super::{Backpressure, MonitorError};
use crate::{Event, verdict::BindingSnapshot};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicU64, Ordering},
        mpsc::Sender,
    },
};

pub(crate) enum Message {
    Event(Arc<Event>),
    Snapshot(Sender<Vec<BindingSnapshot>>),
    Stop,
}

struct State {
    messages: VecDeque<Message>,
    open: bool,
}

/// Bounded multi-producer single-consumer queue.
///
/// Control messages are accepted even when the queue is full.
pub(crate) struct IngestQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl IngestQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                messages: VecDeque::with_capacity(capacity),
                open: true,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn push(&self, event: Arc<Event>, policy: Backpressure) -> Result<(), MonitorError> {
        let mut state = self.state.lock().expect("lock");
        if !state.open {
            return Err(MonitorError::Stopped);
        }
        if state.messages.len() >= self.capacity {
            if let Backpressure::Block { timeout } = policy {
                state = self
                    .not_full
                    .wait_timeout_while(state, timeout, |state| {
                        state.open && state.messages.len() >= self.capacity
                    })
                    .expect("lock")
                    .0;
                if !state.open {
                    return Err(MonitorError::Stopped);
                }
            }
            if state.messages.len() >= self.capacity {
                // Counted under the lock: the count is final once the queue is closed.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(MonitorError::Backpressure {
                    timestamp: event.timestamp,
                });
            }
        }
        state.messages.push_back(Message::Event(event));
        self.not_empty.notify_one();
        Ok(())
    }

    pub(crate) fn push_control(&self, message: Message) -> Result<(), MonitorError> {
        let mut state = self.state.lock().expect("lock");
        if !state.open {
            return Err(MonitorError::Stopped);
        }
        state.messages.push_back(message);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Closes the queue, appending the stop message after every accepted message.
    /// Returns `false` if the queue was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock().expect("lock");
        if !state.open {
            return false;
        }
        state.open = false;
        state.messages.push_back(Message::Stop);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        true
    }

    pub(crate) fn pop(&self) -> Message {
        let mut state = self
            .not_empty
            .wait_while(self.state.lock().expect("lock"), |state| {
                state.messages.is_empty()
            })
            .expect("lock");
        let message = state.messages.pop_front().unwrap_or(Message::Stop);
        self.not_full.notify_one();
        message
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    fn event(timestamp: u64) -> Arc<Event> {
        Arc::new(Event::new(timestamp, "p", 0))
    }

    #[test]
    fn drop_when_full() {
        let queue = IngestQueue::new(1);
        assert!(queue.push(event(1), Backpressure::Drop).is_ok());
        assert!(matches!(
            queue.push(event(2), Backpressure::Drop),
            Err(MonitorError::Backpressure { timestamp: 2 })
        ));
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn block_times_out() {
        let queue = IngestQueue::new(1);
        let policy = Backpressure::Block {
            timeout: Duration::from_millis(10),
        };
        assert!(queue.push(event(1), policy).is_ok());
        assert!(queue.push(event(2), policy).is_err());
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn block_until_consumed() {
        let queue = Arc::new(IngestQueue::new(1));
        let policy = Backpressure::Block {
            timeout: Duration::from_secs(10),
        };
        queue.push(event(1), policy).expect("push");
        let consumer = thread::spawn({
            let queue = Arc::clone(&queue);
            move || {
                thread::sleep(Duration::from_millis(10));
                matches!(queue.pop(), Message::Event(e) if e.timestamp == 1)
            }
        });
        queue.push(event(2), policy).expect("push");
        assert!(consumer.join().expect("join"));
        assert!(matches!(queue.pop(), Message::Event(e) if e.timestamp == 2));
    }

    #[test]
    fn closed_queue() {
        let queue = IngestQueue::new(4);
        queue.push(event(1), Backpressure::Drop).expect("push");
        assert!(queue.close());
        assert!(!queue.close());
        assert!(matches!(
            queue.push(event(2), Backpressure::Drop),
            Err(MonitorError::Stopped)
        ));
        assert!(matches!(queue.pop(), Message::Event(_)));
        assert!(matches!(queue.pop(), Message::Stop));
    }
}
