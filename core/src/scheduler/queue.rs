use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::types::{QueueItem, Task};

/// Every `RETRY_SLOT`-th dispatch prefers a pending retry.
const RETRY_SLOT: u64 = 4;

/// Two collections plus a dispatch counter. Not synchronized; see [`TaskQueue`].
#[derive(Debug, Default)]
pub struct QueueState {
    /// Ascending by estimated cost; dispatched from the end.
    fresh: Vec<QueueItem>,
    /// FIFO.
    retry: VecDeque<QueueItem>,
    dispatch_count: u64,
}

impl QueueState {
    pub fn new(tasks: impl IntoIterator<Item = Arc<Task>>) -> Self {
        let mut fresh: Vec<QueueItem> = tasks.into_iter().map(QueueItem::fresh).collect();
        // Stable, so equal costs keep input order and the later task pops first.
        fresh.sort_by_key(|item| item.task.estimated_cost());
        Self {
            fresh,
            retry: VecDeque::new(),
            dispatch_count: 0,
        }
    }

    /// Next item under the fairness policy: heaviest fresh task first, with a
    /// pending retry taking every fourth slot, or any slot once fresh work
    /// runs out.
    pub fn get_next_task(&mut self) -> Option<QueueItem> {
        let retry_turn = self.dispatch_count % RETRY_SLOT == RETRY_SLOT - 1;
        let item = if !self.retry.is_empty() && (self.fresh.is_empty() || retry_turn) {
            self.retry.pop_front()
        } else {
            self.fresh.pop()
        }?;
        self.dispatch_count += 1;
        Some(item)
    }

    pub fn enqueue_retry(&mut self, item: &QueueItem) {
        self.retry.push_back(item.next_retry());
    }

    pub fn pending_fresh(&self) -> usize {
        self.fresh.len()
    }

    pub fn pending_retries(&self) -> usize {
        self.retry.len()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatch_count
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty() && self.retry.is_empty()
    }
}

/// The queue shared by all worker loops of a run.
///
/// Dequeue and retry-enqueue are atomic with respect to each other, so no
/// two workers ever receive the same item.
#[derive(Debug)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new(tasks: impl IntoIterator<Item = Arc<Task>>) -> Self {
        Self {
            state: Mutex::new(QueueState::new(tasks)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Queue operations cannot panic half-way, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_next_task(&self) -> Option<QueueItem> {
        self.lock().get_next_task()
    }

    pub fn enqueue_retry(&self, item: &QueueItem) {
        self.lock().enqueue_retry(item);
    }

    /// `(fresh, retry)` pending counts.
    pub fn pending(&self) -> (usize, usize) {
        let state = self.lock();
        (state.pending_fresh(), state.pending_retries())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::types::{QueueType, TaskPayload};

    fn task(path: &str, cost: u64) -> Arc<Task> {
        Arc::new(
            Task::new(path, path, TaskPayload::new(format!("http://localhost/{path}")))
                .with_estimated_cost(cost),
        )
    }

    fn drain(state: &mut QueueState) -> Vec<(String, u32)> {
        std::iter::from_fn(|| state.get_next_task())
            .map(|item| (item.path().to_string(), item.attempt))
            .collect()
    }

    #[test]
    fn fresh_dispatches_heaviest_first() {
        let mut state = QueueState::new([task("light", 10), task("heavy", 300), task("mid", 120)]);
        let order = drain(&mut state);
        assert_eq!(
            order,
            vec![
                ("heavy".to_string(), 1),
                ("mid".to_string(), 1),
                ("light".to_string(), 1)
            ]
        );
    }

    #[test]
    fn equal_costs_pop_later_insertion_first() {
        let mut state = QueueState::new([task("first", 100), task("second", 100)]);
        let order: Vec<String> = drain(&mut state).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["second", "first"]);
    }

    #[test]
    fn retry_waits_for_fourth_slot() {
        let mut state = QueueState::new([task("a", 180), task("b", 160), task("c", 140)]);

        let a = state.get_next_task().unwrap();
        assert_eq!(a.path(), "a");
        state.enqueue_retry(&a);

        let rest = drain(&mut state);
        assert_eq!(
            rest,
            vec![
                ("b".to_string(), 1),
                ("c".to_string(), 1),
                ("a".to_string(), 2)
            ]
        );
    }

    #[test]
    fn retry_takes_fourth_slot_while_fresh_remains() {
        let tasks: Vec<_> = (0..6).map(|i| task(&format!("t{i}"), 100 - i)).collect();
        let mut state = QueueState::new(tasks);

        let first = state.get_next_task().unwrap();
        state.enqueue_retry(&first);
        let second = state.get_next_task().unwrap();
        let third = state.get_next_task().unwrap();
        let fourth = state.get_next_task().unwrap();

        assert_eq!(second.queue_type, QueueType::Fresh);
        assert_eq!(third.queue_type, QueueType::Fresh);
        assert_eq!(fourth.queue_type, QueueType::Retry);
        assert_eq!(fourth.path(), first.path());
        assert_eq!(fourth.attempt, 2);
        assert_eq!(state.pending_fresh(), 3);
    }

    #[test]
    fn retries_are_fifo() {
        let mut state = QueueState::new([task("x", 2), task("y", 1)]);
        let x = state.get_next_task().unwrap();
        let y = state.get_next_task().unwrap();
        state.enqueue_retry(&x);
        state.enqueue_retry(&y);

        let order: Vec<String> = drain(&mut state).into_iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec!["x", "y"]);
    }

    #[test]
    fn burst_of_retries_does_not_starve_fresh() {
        let tasks: Vec<_> = (0..8).map(|i| task(&format!("t{i}"), 100 + i)).collect();
        let mut state = QueueState::new(tasks);

        let items: Vec<_> = (0..4).map(|_| state.get_next_task().unwrap()).collect();
        for item in &items {
            state.enqueue_retry(item);
        }

        // Dispatches 4..=7: only the 8th (index 7) is a retry slot.
        let kinds: Vec<QueueType> = (0..4)
            .map(|_| state.get_next_task().unwrap().queue_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                QueueType::Fresh,
                QueueType::Fresh,
                QueueType::Fresh,
                QueueType::Retry
            ]
        );
    }

    #[test]
    fn empty_queue_returns_none() {
        let queue = TaskQueue::new(Vec::<Arc<Task>>::new());
        assert!(queue.is_empty());
        assert!(queue.get_next_task().is_none());
    }

    #[test]
    fn enqueue_retry_never_touches_fresh() {
        let queue = TaskQueue::new([task("a", 1), task("b", 2)]);
        let b = queue.get_next_task().unwrap();
        queue.enqueue_retry(&b);
        assert_eq!(queue.pending(), (1, 1));
    }
}
