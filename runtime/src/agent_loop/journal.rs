//! Bounded in-memory event journal for one agent run (supplemented
//! feature, SPEC_FULL.md §2). Makes the "never return a tool dump"
//! contract of the iteration controller observable without coupling it to
//! a specific audit sink — C9 drains this after the run completes.

use std::collections::VecDeque;

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub enum AgentStepEvent {
    IterationStarted { index: u32 },
    ToolDispatched { tool: String },
    ToolRejected { tool: String },
    ObservationCollected { byte_len: usize },
    ParseFailure { reason: String },
    AnswerProduced,
    IterationsExhausted,
}

/// Fixed-capacity ring of events for a single agent run. Never blocks,
/// never grows unbounded — the oldest event is dropped once full.
pub struct BufferedJournal {
    events: Mutex<VecDeque<AgentStepEvent>>,
    capacity: usize,
}

impl BufferedJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, event: AgentStepEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<AgentStepEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for BufferedJournal {
    fn default() -> Self {
        Self::new(128)
    }
}
