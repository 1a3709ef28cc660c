//! Indexed binary min-heap
//!
//! Every element stores its own position in the backing array, so an element
//! the caller still holds a handle to can be removed or re-prioritised in
//! O(log n) without scanning. The scheduler keeps its timers here.

/// Index written into elements that are no longer stored in a heap.
pub const DETACHED: usize = usize::MAX;

/// An element that can live in an [`IndexedMinHeap`].
///
/// The heap calls `set_heap_index` every time the element settles at a new
/// position. Elements shared with the caller (for example through `Rc`) need
/// interior mutability for the index so the caller observes the update.
pub trait HeapElement {
    /// Ordering key, smallest first.
    type Priority: Ord;

    /// Current priority of the element
    fn priority(&self) -> Self::Priority;

    /// Position of the element in the heap, or [`DETACHED`]
    fn heap_index(&self) -> usize;

    /// Record the position of the element in the heap
    fn set_heap_index(&mut self, index: usize);
}

/// Binary min-heap whose elements track their own array position.
///
/// # Invariants
///
/// - For every position `i`: `heap[i].heap_index() == i`
/// - For every `i > 0`: `heap[(i - 1) / 2].priority() <= heap[i].priority()`
/// - Elements removed through `pop_min` or `delete` carry [`DETACHED`]
#[derive(Debug)]
pub struct IndexedMinHeap<T> {
    heap: Vec<T>,
}

impl<T: HeapElement> IndexedMinHeap<T> {
    /// Create an empty heap
    pub fn new() -> Self {
        Self { heap: Vec::new() }
    }

    /// Create an empty heap with room for `capacity` elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::with_capacity(capacity),
        }
    }

    /// Number of stored elements
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the heap holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Element with the smallest priority, without removing it
    #[inline]
    pub fn peek_min(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Whether `elem` currently sits in this heap, judged by its stored index
    pub fn contains(&self, elem: &T) -> bool {
        elem.heap_index() < self.heap.len()
    }

    /// Remove and return the element with the smallest priority
    pub fn pop_min(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }

        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let mut top = self.heap.pop()?;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }

        top.set_heap_index(DETACHED);
        Some(top)
    }

    /// Insert an element and return a reference to it at its settled position
    pub fn push(&mut self, elem: T) -> &T {
        self.heap.push(elem);
        let index = self.sift_up(self.heap.len() - 1);
        &self.heap[index]
    }

    /// Remove `elem` using its stored index.
    ///
    /// Returns the removed element, or `None` when the stored index does not
    /// point into this heap (already popped or deleted).
    pub fn delete(&mut self, elem: &T) -> Option<T> {
        self.delete_at(elem.heap_index())
    }

    /// Remove the element stored at `index`
    pub fn delete_at(&mut self, index: usize) -> Option<T> {
        if index >= self.heap.len() {
            return None;
        }

        // Move the tail into the hole, then settle it. The tail may belong
        // to another subtree, so it can need to travel either way.
        let last = self.heap.len() - 1;
        self.heap.swap(index, last);
        let mut removed = self.heap.pop()?;
        if index < self.heap.len() && self.sift_down(index) == index {
            self.sift_up(index);
        }

        removed.set_heap_index(DETACHED);
        Some(removed)
    }

    /// Restore heap order after `elem`'s priority grew
    pub fn increase(&mut self, elem: &T) {
        let index = elem.heap_index();
        if index < self.heap.len() {
            self.sift_down(index);
        }
    }

    /// Restore heap order after `elem`'s priority shrank
    pub fn decrease(&mut self, elem: &T) {
        let index = elem.heap_index();
        if index < self.heap.len() {
            self.sift_up(index);
        }
    }

    /// Iterate over elements in array order (not priority order)
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.heap.iter()
    }

    /// Remove every element, detaching each of them
    pub fn clear(&mut self) {
        for mut elem in self.heap.drain(..) {
            elem.set_heap_index(DETACHED);
        }
    }

    fn sift_up(&mut self, mut i: usize) -> usize {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].priority() <= self.heap[i].priority() {
                break;
            }

            self.heap.swap(parent, i);
            self.heap[i].set_heap_index(i);
            i = parent;
        }

        self.heap[i].set_heap_index(i);
        i
    }

    fn sift_down(&mut self, mut i: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;

            // Left child wins ties
            let mut min = i;
            if self.heap[left].priority() < self.heap[min].priority() {
                min = left;
            }
            if right < len && self.heap[right].priority() < self.heap[min].priority() {
                min = right;
            }
            if min == i {
                break;
            }

            self.heap.swap(min, i);
            self.heap[i].set_heap_index(i);
            i = min;
        }

        self.heap[i].set_heap_index(i);
        i
    }
}

impl<T: HeapElement> Default for IndexedMinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Probe {
        priority: Cell<u32>,
        index: Cell<usize>,
        tag: u32,
    }

    type Handle = Rc<Probe>;

    impl HeapElement for Rc<Probe> {
        type Priority = u32;

        fn priority(&self) -> u32 {
            self.priority.get()
        }

        fn heap_index(&self) -> usize {
            self.index.get()
        }

        fn set_heap_index(&mut self, index: usize) {
            self.index.set(index);
        }
    }

    fn element(priority: u32, tag: u32) -> Handle {
        Rc::new(Probe {
            priority: Cell::new(priority),
            index: Cell::new(DETACHED),
            tag,
        })
    }

    fn assert_invariants(heap: &IndexedMinHeap<Handle>) {
        for (i, elem) in heap.iter().enumerate() {
            assert_eq!(elem.heap_index(), i, "stale index for tag {}", elem.tag);
            if i > 0 {
                let parent = &heap.heap[(i - 1) / 2];
                assert!(parent.priority() <= elem.priority());
            }
        }
    }

    fn drain(heap: &mut IndexedMinHeap<Handle>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(elem) = heap.pop_min() {
            out.push(elem.priority());
            assert_invariants(heap);
        }
        out
    }

    #[test]
    fn test_empty_heap() {
        let mut heap: IndexedMinHeap<Handle> = IndexedMinHeap::new();
        assert!(heap.is_empty());
        assert!(heap.peek_min().is_none());
        assert!(heap.pop_min().is_none());
    }

    #[test]
    fn test_push_pop_ascending() {
        let mut heap = IndexedMinHeap::new();
        for (tag, p) in [5, 1, 3, 9, 2, 8].into_iter().enumerate() {
            heap.push(element(p, tag as u32));
            assert_invariants(&heap);
        }

        assert_eq!(heap.len(), 6);
        assert_eq!(heap.peek_min().map(|e| e.priority()), Some(1));
        assert_eq!(drain(&mut heap), vec![1, 2, 3, 5, 8, 9]);
    }

    #[test]
    fn test_push_returns_settled_element() {
        let mut heap = IndexedMinHeap::new();
        heap.push(element(4, 0));
        let settled = heap.push(element(1, 1));
        assert_eq!(settled.tag, 1);
        assert_eq!(settled.heap_index(), 0);
    }

    #[test]
    fn test_single_element_index_written() {
        let mut heap = IndexedMinHeap::new();
        let only = element(7, 0);
        heap.push(Rc::clone(&only));
        assert_eq!(only.heap_index(), 0);

        let popped = heap.pop_min().unwrap();
        assert_eq!(popped.heap_index(), DETACHED);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_delete_middle_and_tail() {
        let mut heap = IndexedMinHeap::new();
        let handles: Vec<Handle> = [4, 7, 2, 9, 1, 6]
            .iter()
            .enumerate()
            .map(|(t, &p)| element(p, t as u32))
            .collect();
        for h in &handles {
            heap.push(Rc::clone(h));
        }

        let removed = heap.delete(&handles[1]).unwrap();
        assert_eq!(removed.tag, 1);
        assert!(!heap.contains(&handles[1]));
        assert_invariants(&heap);

        // Whatever sits at the tail right now
        let tail_tag = heap.heap[heap.len() - 1].tag;
        let tail = Rc::clone(&handles[tail_tag as usize]);
        heap.delete(&tail).unwrap();
        assert_invariants(&heap);

        assert_eq!(heap.len(), 4);
        let rest = drain(&mut heap);
        assert!(!rest.contains(&7));
        assert!(rest.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_delete_detached_is_noop() {
        let mut heap = IndexedMinHeap::new();
        let a = element(1, 0);
        let b = element(2, 1);
        heap.push(Rc::clone(&a));
        heap.push(Rc::clone(&b));

        heap.pop_min();
        assert!(heap.delete(&a).is_none());
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.peek_min().map(|e| e.tag), Some(1));
    }

    #[test]
    fn test_delete_moves_tail_up() {
        // Tail of the right subtree is smaller than the left subtree's node
        // being removed, so it must bubble up past the hole.
        let mut heap = IndexedMinHeap::new();
        let handles: Vec<Handle> = [1, 10, 2, 11, 12, 3, 4]
            .iter()
            .enumerate()
            .map(|(t, &p)| element(p, t as u32))
            .collect();
        for h in &handles {
            heap.push(Rc::clone(h));
        }

        heap.delete(&handles[3]).unwrap();
        assert_invariants(&heap);
        assert_eq!(drain(&mut heap), vec![1, 2, 3, 4, 10, 12]);
    }

    #[test]
    fn test_increase_and_decrease() {
        let mut heap = IndexedMinHeap::new();
        let handles: Vec<Handle> = (0..8).map(|t| element(t * 10, t)).collect();
        for h in &handles {
            heap.push(Rc::clone(h));
        }

        handles[0].priority.set(75);
        heap.increase(&handles[0]);
        assert_invariants(&heap);
        assert_eq!(heap.peek_min().map(|e| e.tag), Some(1));

        handles[7].priority.set(5);
        heap.decrease(&handles[7]);
        assert_invariants(&heap);
        assert_eq!(heap.peek_min().map(|e| e.tag), Some(7));
    }

    #[test]
    fn test_left_child_wins_ties() {
        let mut heap = IndexedMinHeap::new();
        let root = element(0, 0);
        let left = element(5, 1);
        let right = element(5, 2);
        heap.push(Rc::clone(&root));
        heap.push(Rc::clone(&left));
        heap.push(Rc::clone(&right));

        root.priority.set(9);
        heap.increase(&root);
        assert_eq!(left.heap_index(), 0);
        assert_eq!(right.heap_index(), 2);
        assert_eq!(root.heap_index(), 1);
    }

    #[test]
    fn test_random_interleaving_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut heap = IndexedMinHeap::new();
        let mut live: Vec<Handle> = Vec::new();
        let mut pushes = 0usize;
        let mut removals = 0usize;

        for step in 0..5_000u32 {
            match rng.gen_range(0..5) {
                0 | 1 => {
                    let h = element(rng.gen_range(0..1_000), step);
                    heap.push(Rc::clone(&h));
                    live.push(h);
                    pushes += 1;
                }
                2 => {
                    if let Some(top) = heap.pop_min() {
                        let min = live.iter().map(|h| h.priority()).min().unwrap();
                        assert_eq!(top.priority(), min);
                        live.retain(|h| !Rc::ptr_eq(h, &top));
                        removals += 1;
                    }
                }
                3 => {
                    if !live.is_empty() {
                        let victim = live.swap_remove(rng.gen_range(0..live.len()));
                        assert!(heap.delete(&victim).is_some());
                        removals += 1;
                    }
                }
                _ => {
                    if !live.is_empty() {
                        let h = &live[rng.gen_range(0..live.len())];
                        let old = h.priority();
                        let new = rng.gen_range(0..1_000);
                        h.priority.set(new);
                        if new > old {
                            heap.increase(h);
                        } else {
                            heap.decrease(h);
                        }
                    }
                }
            }

            assert_invariants(&heap);
            assert_eq!(heap.len(), pushes - removals);
            if let Some(min) = live.iter().map(|h| h.priority()).min() {
                assert_eq!(heap.peek_min().map(|e| e.priority()), Some(min));
            }
        }
    }

    #[test]
    fn test_clear_detaches() {
        let mut heap = IndexedMinHeap::new();
        let a = element(3, 0);
        heap.push(Rc::clone(&a));
        heap.clear();
        assert!(heap.is_empty());
        assert_eq!(a.heap_index(), DETACHED);
    }
}
