// ── Deferred tasks ───────────────────────────────────────────────────────────
//
// Deferred delivery on the owning event loop.  `execute_javascript` hands its
// result to the caller through a posted task instead of calling back inline,
// so application code is never re-entered from inside the evaluation call.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

pub type Task = Box<dyn FnOnce()>;

/// Posts work to run later on the owning thread.
pub trait TaskRunner {
    fn post_task(&self, task: Task);
}

/// Single-threaded FIFO of posted tasks.
///
/// Cloning shares the queue.  Tasks posted while `run_pending` is running are
/// left for the next call.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run the tasks queued so far.  Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Task> = self.tasks.borrow_mut().drain(..).collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }
}

impl TaskRunner for TaskQueue {
    fn post_task(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn tasks_run_in_order_and_only_when_pumped() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            queue.post_task(Box::new(move || log.borrow_mut().push(i)));
        }
        assert!(log.borrow().is_empty());
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_posted_while_running_wait_for_next_turn() {
        let queue = TaskQueue::new();
        let ran = Rc::new(Cell::new(0));
        let (q, r) = (queue.clone(), Rc::clone(&ran));
        queue.post_task(Box::new(move || {
            r.set(r.get() + 1);
            let r2 = Rc::clone(&r);
            q.post_task(Box::new(move || r2.set(r2.get() + 10)));
        }));
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(ran.get(), 1);
        assert!(!queue.is_empty());
        queue.run_pending();
        assert_eq!(ran.get(), 11);
        assert!(queue.is_empty());
    }
}
