// Bounded producer/consumer queues for the command FIFO and triangle ring.
//
// The host pushes width-tagged register writes from the dispatcher; the FIFO
// worker drains them and in turn pushes complete triangle setups to the ring
// for the render worker. Both sides block rather than drop: the queue is the
// bus-stall model. An entry that begins an auto-executing primitive is only
// accepted while the reserve headroom is free, so a long primitive can never
// wedge the queue right at the high-water mark.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

pub const FIFO_CAPACITY: usize = 65536;
pub const FIFO_AUTOEXEC_RESERVE: usize = 8192;
pub const TRI_RING_CAPACITY: usize = 4096;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessWidth {
    Byte,
    Word,
    Dword,
}

impl AccessWidth {
    pub fn from_size(size: usize) -> Self {
        match size {
            1 => AccessWidth::Byte,
            2 => AccessWidth::Word,
            _ => AccessWidth::Dword,
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            AccessWidth::Byte => 1,
            AccessWidth::Word => 2,
            AccessWidth::Dword => 4,
        }
    }
}

/// One queued register write, tagged with the access width so the engines
/// can reassemble sub-word image data exactly as it arrived on the bus.
#[derive(Copy, Clone, Debug)]
pub struct FifoEntry {
    pub addr: u32,
    pub value: u32,
    pub width: AccessWidth,
}

/// What the worker sees next. `Empty` is delivered exactly once per
/// drain-to-empty so the worker can raise the drained status bits before
/// parking.
pub enum Drained<T> {
    Item(T),
    Empty,
    Shutdown,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    busy: bool,
    shutdown: bool,
}

pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    idle: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                busy: false,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            idle: Condvar::new(),
            capacity,
        }
    }

    /// Push, blocking until at least `min_free` slots are free (1 for a
    /// plain entry). Returns true if the producer had to wait, which the
    /// dispatcher reports as a FIFO overflow condition.
    pub fn push(&self, item: T, min_free: usize) -> bool {
        let need = min_free.max(1);
        let mut waited = false;
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return false,
        };
        while self.capacity - g.items.len() < need {
            if g.shutdown {
                return waited;
            }
            waited = true;
            g = match self.not_full.wait(g) {
                Ok(g) => g,
                Err(_) => return waited,
            };
        }
        if !g.shutdown {
            g.items.push_back(item);
            self.not_empty.notify_one();
        }
        waited
    }

    /// Worker side: next item, a one-shot `Empty` at each drain boundary, or
    /// `Shutdown`.
    pub fn next(&self) -> Drained<T> {
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return Drained::Shutdown,
        };
        loop {
            if g.shutdown {
                g.busy = false;
                self.idle.notify_all();
                return Drained::Shutdown;
            }
            if let Some(item) = g.items.pop_front() {
                g.busy = true;
                self.not_full.notify_all();
                return Drained::Item(item);
            }
            if g.busy {
                g.busy = false;
                self.idle.notify_all();
                return Drained::Empty;
            }
            g = match self.not_empty.wait(g) {
                Ok(g) => g,
                Err(_) => return Drained::Shutdown,
            };
        }
    }

    /// Wake the worker without queueing anything (status-read side effect).
    pub fn kick(&self) {
        self.not_empty.notify_all();
    }

    pub fn shutdown(&self) {
        if let Ok(mut g) = self.inner.lock() {
            g.shutdown = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.idle.notify_all();
    }

    /// Block until the queue is empty and the worker is parked.
    pub fn wait_idle(&self) {
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return,
        };
        while !g.shutdown && (!g.items.is_empty() || g.busy) {
            g = match self.idle.wait(g) {
                Ok(g) => g,
                Err(_) => return,
            };
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_preserves_order_across_widths() {
        let q: BoundedQueue<FifoEntry> = BoundedQueue::new(16);
        for (i, w) in [AccessWidth::Byte, AccessWidth::Word, AccessWidth::Dword]
            .iter()
            .enumerate()
        {
            q.push(
                FifoEntry {
                    addr: i as u32,
                    value: i as u32 * 0x11,
                    width: *w,
                },
                0,
            );
        }
        for i in 0..3u32 {
            match q.next() {
                Drained::Item(e) => {
                    assert_eq!(e.addr, i);
                    assert_eq!(e.value, i * 0x11);
                }
                _ => panic!("expected item"),
            }
        }
        assert!(matches!(q.next(), Drained::Empty));
    }

    #[test]
    fn drain_boundary_reported_once() {
        let q: BoundedQueue<u32> = BoundedQueue::new(4);
        q.push(1, 0);
        assert!(matches!(q.next(), Drained::Item(1)));
        assert!(matches!(q.next(), Drained::Empty));
        // Parked now; a new item resumes the cycle.
        q.push(2, 0);
        assert!(matches!(q.next(), Drained::Item(2)));
        assert!(matches!(q.next(), Drained::Empty));
    }

    // The low-water policy under its own name: a primitive-starting entry is
    // refused admission while free space is inside the reserve, while plain
    // entries still go through. This pins down the open hardware question in
    // one place.
    #[test]
    fn autoexec_start_blocks_inside_reserve() {
        const CAP: usize = 16;
        const RESERVE: usize = 8;
        let q: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(CAP));
        for i in 0..10 {
            q.push(i, 0); // free = 6 < RESERVE
        }
        let done = Arc::new(AtomicBool::new(false));
        let q2 = Arc::clone(&q);
        let done2 = Arc::clone(&done);
        let t = thread::spawn(move || {
            q2.push(99, RESERVE);
            done2.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst), "push crossed the reserve");
        // A plain entry is still admitted at the same fill level.
        assert!(!q.push(100, 0));
        // Drain until free >= RESERVE: 11 queued, need len <= 8.
        for _ in 0..4 {
            match q.next() {
                Drained::Item(_) => {}
                _ => panic!("expected item"),
            }
        }
        t.join().ok();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn shutdown_unblocks_everyone() {
        let q: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(2));
        q.push(1, 0);
        q.push(2, 0);
        let q2 = Arc::clone(&q);
        let t = thread::spawn(move || {
            q2.push(3, 0); // full: blocks
        });
        thread::sleep(Duration::from_millis(20));
        q.shutdown();
        t.join().ok();
        assert!(matches!(q.next(), Drained::Shutdown));
    }
}
