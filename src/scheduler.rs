#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Swap the offset markers so the staged panels start sliding.
    StartSlide,
    /// Scroll to the section named by the initial deep link.
    DeepLinkScroll,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    due_ms: u64,
    seq: u64,
    task: Deferred,
}

/// Delayed tasks on a logical clock. Tasks carry no captured state: when one
/// fires, the book reads its live state and drops the task if it has moved on.
#[derive(Debug, Default)]
pub struct Timers {
    now_ms: u64,
    seq: u64,
    pending: Vec<Pending>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, delay_ms: u64, task: Deferred) {
        self.seq += 1;
        self.pending.push(Pending {
            due_ms: self.now_ms.saturating_add(delay_ms),
            seq: self.seq,
            task,
        });
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Milliseconds until the next task is due.
    pub fn next_delay_ms(&self) -> Option<u64> {
        self.pending
            .iter()
            .map(|p| p.due_ms.saturating_sub(self.now_ms))
            .min()
    }

    /// Moves the clock forward and returns every task that became due, oldest first.
    pub fn advance(&mut self, elapsed_ms: u64) -> Vec<Deferred> {
        self.now_ms = self.now_ms.saturating_add(elapsed_ms);
        let now = self.now_ms;
        let mut due = Vec::new();
        self.pending.retain(|p| {
            if p.due_ms <= now {
                due.push(*p);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|p| (p.due_ms, p.seq));
        due.into_iter().map(|p| p.task).collect()
    }
}
