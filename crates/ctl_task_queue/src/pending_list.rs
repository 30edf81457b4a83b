use std::sync::Arc;
use std::time::Instant;

use crate::task::TaskInner;

/// One task waiting to run, carrying its own deadline so the list can be kept ordered without
/// re-locking the task's state mutex on every comparison.
pub(crate) struct Entry {
    pub(crate) task: Arc<TaskInner>,
    pub(crate) deadline: Option<Instant>,
}

/// The set of not-yet-running tasks, ordered the way `roc_ctl::TaskQueue`'s intrusive list is
/// ordered: tasks without a deadline ("process immediately") form a FIFO run at the front,
/// followed by deadline-bearing tasks in non-decreasing deadline order. `immediate_count`
/// plays the role of the original's `first_task_with_deadline_` cursor, letting an immediate
/// task be appended in O(1) instead of scanning the whole list.
///
/// This is a flat `Vec` rather than an intrusive list: removal is O(n) instead of O(1), which
/// is the right trade for a control-plane queue (tens of tasks, not per-sample audio buffers)
/// in exchange for never needing raw back-pointers into task storage.
#[derive(Default)]
pub(crate) struct PendingList {
    items: Vec<Entry>,
    immediate_count: usize,
}

impl PendingList {
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn front(&self) -> Option<&Entry> {
        self.items.first()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Entry> {
        if self.items.is_empty() {
            return None;
        }
        let entry = self.items.remove(0);
        if self.immediate_count > 0 {
            self.immediate_count -= 1;
        }
        Some(entry)
    }

    /// Inserts `task` with the given deadline, keeping the ordering invariant.
    pub(crate) fn insert(&mut self, task: Arc<TaskInner>, deadline: Option<Instant>) {
        match deadline {
            None => {
                self.items
                    .insert(self.immediate_count, Entry { task, deadline });
                self.immediate_count += 1;
            }
            Some(d) => {
                let mut pos = self.immediate_count;
                while pos < self.items.len() {
                    if self.items[pos].deadline.is_some_and(|existing| existing > d) {
                        break;
                    }
                    pos += 1;
                }
                self.items.insert(pos, Entry { task, deadline });
            }
        }
    }

    /// Removes `task` if it is present, for reschedule and cancel.
    pub(crate) fn remove(&mut self, task: &Arc<TaskInner>) -> Option<Entry> {
        let idx = self.items.iter().position(|e| Arc::ptr_eq(&e.task, task))?;
        let entry = self.items.remove(idx);
        if idx < self.immediate_count {
            self.immediate_count -= 1;
        }
        Some(entry)
    }

    pub(crate) fn contains(&self, task: &Arc<TaskInner>) -> bool {
        self.items.iter().any(|e| Arc::ptr_eq(&e.task, task))
    }

    /// `None` if `task` isn't in the list; `Some(deadline)` (itself possibly `None` for an
    /// immediate task) if it is. Lets a caller decide whether moving the task would change
    /// its position before committing to a remove+reinsert.
    pub(crate) fn deadline_of(&self, task: &Arc<TaskInner>) -> Option<Option<Instant>> {
        self.items
            .iter()
            .find(|e| Arc::ptr_eq(&e.task, task))
            .map(|e| e.deadline)
    }
}
