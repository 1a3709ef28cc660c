//! Timer entries kept in the scheduler's indexed heap

use super::wait::WaitKey;
use crate::heap::{HeapElement, IndexedMinHeap, DETACHED};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Scheduled wake for one pending wait.
///
/// Shared between the heap and the wait entry so the entry can delete the
/// timer by index when the wait resolves some other way. Timers with equal
/// deadlines fire in arming order.
#[derive(Debug)]
pub(crate) struct Timer {
    /// When to wake
    pub(crate) deadline: Instant,
    /// Arming sequence number
    pub(crate) seq: u64,
    /// Wait to resume
    pub(crate) key: WaitKey,
    heap_index: Cell<usize>,
}

impl Timer {
    pub(crate) fn new(deadline: Instant, seq: u64, key: WaitKey) -> Rc<Self> {
        Rc::new(Self {
            deadline,
            seq,
            key,
            heap_index: Cell::new(DETACHED),
        })
    }
}

impl HeapElement for Rc<Timer> {
    type Priority = (Instant, u64);

    fn priority(&self) -> (Instant, u64) {
        (self.deadline, self.seq)
    }

    fn heap_index(&self) -> usize {
        self.heap_index.get()
    }

    fn set_heap_index(&mut self, index: usize) {
        self.heap_index.set(index);
    }
}

pub(crate) type TimerHeap = IndexedMinHeap<Rc<Timer>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskId;
    use std::time::Duration;

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let keys: Vec<WaitKey> = (0..3).map(|_| WaitKey::Task(TaskId::new())).collect();

        for (seq, (key, secs)) in keys.iter().zip([5u64, 1, 3]).enumerate() {
            heap.push(Timer::new(base + Duration::from_secs(secs), seq as u64, *key));
        }

        let order: Vec<WaitKey> = std::iter::from_fn(|| heap.pop_min().map(|t| t.key)).collect();
        assert_eq!(order, vec![keys[1], keys[2], keys[0]]);
    }

    #[test]
    fn test_deleted_timer_never_fires() {
        let base = Instant::now();
        let mut heap = TimerHeap::new();
        let early = Timer::new(base + Duration::from_millis(1), 0, WaitKey::Task(TaskId::new()));
        let late = Timer::new(base + Duration::from_millis(2), 1, WaitKey::Task(TaskId::new()));
        heap.push(Rc::clone(&early));
        heap.push(Rc::clone(&late));

        assert!(heap.delete(&early).is_some());
        assert_eq!(early.heap_index(), DETACHED);

        let fired: Vec<WaitKey> = std::iter::from_fn(|| heap.pop_min().map(|t| t.key)).collect();
        assert_eq!(fired, vec![late.key]);
    }

    #[test]
    fn test_equal_deadlines_fire_in_arming_order() {
        let deadline = Instant::now();
        let mut heap = TimerHeap::new();
        let keys: Vec<WaitKey> = (0..4).map(|_| WaitKey::Task(TaskId::new())).collect();

        for (seq, key) in keys.iter().enumerate().rev() {
            heap.push(Timer::new(deadline, seq as u64, *key));
        }

        let order: Vec<WaitKey> = std::iter::from_fn(|| heap.pop_min().map(|t| t.key)).collect();
        assert_eq!(order, keys);
    }
}
