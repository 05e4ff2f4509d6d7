//! Single-threaded deferred-event scheduler (base spec §3, §5): drives the
//! retransmission ladder for an in-flight test and the Charlie-ring's entry
//! expiry, off of a dedicated background thread so the reader thread never
//! blocks on a sleep.
//!
//! Grounded on the teacher's labeled-thread-spawn convention
//! (`runtime::thread::spawn`) and its `crossbeam_channel`-based worker loops.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as chan;

use crate::runtime::thread;

/// Opaque handle to a scheduled event, usable to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u64);

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    at: Instant,
    id: TimerId,
    callback: Callback,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}
impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at)
    }
}

enum Command {
    Schedule(Scheduled),
    Cancel(TimerId),
    Shutdown,
}

/// A background scheduler that runs callbacks after a delay, on a single
/// dedicated thread. Callbacks run inline on the timer thread -- keep them
/// short, the way the base spec's retransmit and expiry callbacks are
/// (enqueue a send, clear a slot).
pub struct TimerService {
    commands: chan::Sender<Command>,
    next_id: Arc<Mutex<u64>>,
    handle: Option<JoinHandle<()>>,
}

impl TimerService {
    pub fn new() -> Self {
        let (commands, receiver) = chan::unbounded();
        let handle = thread::spawn("reach", "timer", move || Self::run(receiver));

        Self {
            commands,
            next_id: Arc::new(Mutex::new(0)),
            handle: Some(handle),
        }
    }

    fn run(receiver: chan::Receiver<Command>) {
        let mut heap: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();
        let mut cancelled = std::collections::HashSet::new();

        loop {
            let timeout = heap
                .peek()
                .map(|Reverse(s)| s.at.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(3600));

            match receiver.recv_timeout(timeout) {
                Ok(Command::Schedule(s)) => heap.push(Reverse(s)),
                Ok(Command::Cancel(id)) => {
                    cancelled.insert(id);
                }
                Ok(Command::Shutdown) | Err(chan::RecvTimeoutError::Disconnected) => return,
                Err(chan::RecvTimeoutError::Timeout) => {}
            }

            let now = Instant::now();
            while let Some(Reverse(s)) = heap.peek() {
                if s.at > now {
                    break;
                }
                let Reverse(s) = heap.pop().unwrap();
                if !cancelled.remove(&s.id) {
                    (s.callback)();
                }
            }
        }
    }

    /// Schedule `callback` to run after `delay`, returning an id that can be
    /// passed to [`TimerService::cancel`] before it fires.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            TimerId(*next)
        };

        let scheduled = Scheduled {
            at: Instant::now() + delay,
            id,
            callback: Box::new(callback),
        };
        // The timer thread outlives every sender; a send error here would
        // mean it already shut down, which only happens when we're dropping.
        let _ = self.commands.send(Command::Schedule(scheduled));

        id
    }

    /// Best-effort cancellation: if the callback is already running or has
    /// already run, this has no effect.
    pub fn cancel(&self, id: TimerId) {
        let _ = self.commands.send(Command::Cancel(id));
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn schedule_fires_after_delay() {
        let timer = TimerService::new();
        let (tx, rx) = mpsc::channel();

        timer.schedule(Duration::from_millis(20), move || {
            tx.send(()).unwrap();
        });

        rx.recv_timeout(Duration::from_secs(1))
            .expect("callback should have fired");
    }

    #[test]
    fn cancel_before_fire_prevents_callback() {
        let timer = TimerService::new();
        let (tx, rx) = mpsc::channel();

        let id = timer.schedule(Duration::from_millis(50), move || {
            tx.send(()).unwrap();
        });
        timer.cancel(id);

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn multiple_timers_fire_in_order() {
        let timer = TimerService::new();
        let (tx, rx) = mpsc::channel();

        let tx2 = tx.clone();
        timer.schedule(Duration::from_millis(60), move || tx2.send(2).unwrap());
        timer.schedule(Duration::from_millis(10), move || tx.send(1).unwrap());

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 2);
    }
}
