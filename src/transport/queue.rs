//! Bounded blocking FIFO queue
//!
//! Backs the connection pool's free set. `dequeue` blocks while the queue is
//! empty, `enqueue` blocks while it is full, and `stop` wakes everybody up,
//! hands every queued element to the deleter and refuses further traffic.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

type Deleter<T> = Box<dyn Fn(T) + Send + Sync>;

struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// Bounded queue with blocking enqueue/dequeue and a stop signal
pub struct BlockingQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    changed: Condvar,
    deleter: Deleter<T>,
}

impl<T> BlockingQueue<T> {
    /// Create a queue whose elements are simply dropped on stop
    pub fn new(capacity: usize) -> Self {
        Self::with_deleter(capacity, |_| {})
    }

    /// Create a queue that passes leftover (and late) elements to `deleter` once stopped
    pub fn with_deleter(capacity: usize, deleter: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            changed: Condvar::new(),
            deleter: Box::new(deleter),
        }
    }

    /// Push an element, blocking while the queue is full
    ///
    /// After `stop` the element is handed to the deleter instead.
    pub fn enqueue(&self, item: T) {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.stopped {
            self.changed.wait(&mut state);
        }

        if state.stopped {
            drop(state);
            (self.deleter)(item);
            return;
        }

        state.items.push_back(item);
        self.changed.notify_all();
    }

    /// Pop the oldest element, blocking while the queue is empty
    ///
    /// Returns `None` once the queue has been stopped.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.stopped {
            self.changed.wait(&mut state);
        }

        if state.stopped {
            return None;
        }

        let item = state.items.pop_front();
        self.changed.notify_all();
        item
    }

    /// Stop the queue: wake all waiters and delete every queued element
    pub fn stop(&self) {
        let leftovers: Vec<T> = {
            let mut state = self.state.lock();
            state.stopped = true;
            self.changed.notify_all();
            state.items.drain(..).collect()
        };

        for item in leftovers {
            (self.deleter)(item);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
