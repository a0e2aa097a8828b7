//! Derived-value graph and scheduler
//!
//! Inputs and derived values are named; every derived value declares what it
//! is recomputed from. The scheduler owns one slot per derived value holding
//! its generation, its debounce deadline and the task computing it.
//! Invalidating a slot bumps the generation, aborts the running task and
//! restarts the quiet period, so a result only commits while its generation
//! is still current.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Values set from outside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Expression,
    ContextStr,
    GrammarTag,
    Plugin,
    Selection,
}

impl Input {
    /// Derived values recomputed when this input changes
    pub fn dependents(self) -> &'static [DerivedKey] {
        match self {
            Input::Expression | Input::GrammarTag | Input::Plugin => &[DerivedKey::Tree],
            Input::ContextStr => &[DerivedKey::Context, DerivedKey::Tree],
            Input::Selection => &[DerivedKey::SelectionMark],
        }
    }
}

/// Values the engine derives. Declaration order is dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKey {
    Context,
    Tree,
    Output,
    SelectionMark,
}

impl DerivedKey {
    pub const ALL: [DerivedKey; 4] = [
        DerivedKey::Context,
        DerivedKey::Tree,
        DerivedKey::Output,
        DerivedKey::SelectionMark,
    ];

    /// Derived values recomputed when this one commits
    pub fn dependents(self) -> &'static [DerivedKey] {
        match self {
            DerivedKey::Context | DerivedKey::Tree => &[DerivedKey::Output],
            DerivedKey::Output | DerivedKey::SelectionMark => &[],
        }
    }

    /// Selection marks follow the pointer immediately
    fn debounced(self) -> bool {
        !matches!(self, DerivedKey::SelectionMark)
    }

    fn index(self) -> usize {
        match self {
            DerivedKey::Context => 0,
            DerivedKey::Tree => 1,
            DerivedKey::Output => 2,
            DerivedKey::SelectionMark => 3,
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

/// Debounce and staleness bookkeeping for every derived value
pub(crate) struct Scheduler {
    debounce: Duration,
    slots: [Slot; 4],
}

impl Scheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            slots: Default::default(),
        }
    }

    /// Mark `key` out of date. Returns the new generation.
    pub fn invalidate(&mut self, key: DerivedKey, now: Instant) -> u64 {
        let delay = if key.debounced() {
            self.debounce
        } else {
            Duration::ZERO
        };
        let slot = &mut self.slots[key.index()];
        slot.generation += 1;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        slot.deadline = Some(now + delay);
        slot.generation
    }

    pub fn generation(&self, key: DerivedKey) -> u64 {
        self.slots[key.index()].generation
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().filter_map(|s| s.deadline).min()
    }

    /// Slots whose quiet period has elapsed, in dependency order
    pub fn take_due(&mut self, now: Instant) -> Vec<(DerivedKey, u64)> {
        let mut due = Vec::new();
        for key in DerivedKey::ALL {
            let slot = &mut self.slots[key.index()];
            if matches!(slot.deadline, Some(d) if d <= now) {
                slot.deadline = None;
                due.push((key, slot.generation));
            }
        }
        due
    }

    /// Remember the task computing `generation` of `key`
    pub fn track(&mut self, key: DerivedKey, generation: u64, task: JoinHandle<()>) {
        let slot = &mut self.slots[key.index()];
        if slot.generation == generation {
            slot.task = Some(task);
        } else {
            task.abort();
        }
    }

    /// Called when a computation finishes; `true` if it is still current
    pub fn finish(&mut self, key: DerivedKey, generation: u64) -> bool {
        let slot = &mut self.slots[key.index()];
        if slot.generation != generation {
            return false;
        }
        slot.task = None;
        true
    }

    /// Nothing pending and nothing running
    pub fn is_idle(&self) -> bool {
        self.slots
            .iter()
            .all(|s| s.deadline.is_none() && s.task.is_none())
    }

    pub fn cancel_all(&mut self) {
        for slot in &mut self.slots {
            slot.deadline = None;
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }
}
