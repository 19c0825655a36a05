//! Deferred task scheduling.
//!
//! Every timed behaviour (disconnect grace periods, phase deadlines, staged
//! reveals) is a [`TimerTask`] in one [`Scheduler`]. The engine pops due
//! tasks one at a time, so callbacks never interleave.
//!
//! A task is removed from the queue before it is handed out. Anything that
//! holds a [`TimerId`] can therefore tell whether its timer already fired by
//! comparing handles.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::state::player::PlayerId;

/// Handle to a scheduled task.
pub type TimerId = u64;

/// Work to run when a timer comes due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    /// Grace period expired for a disconnected player.
    RemoveDisconnected {
        lobby_code: String,
        player_id: PlayerId,
    },

    /// Phase timer owned by a round.
    Round {
        lobby_code: String,
        round_id: u64,
        key: &'static str,
    },
}

/// Timer queue ordered by deadline.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: TimerId,
    queue: BTreeMap<(Instant, TimerId), TimerTask>,
    deadlines: HashMap<TimerId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task at an absolute deadline.
    pub fn schedule(&mut self, at: Instant, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.queue.insert((at, id), task);
        self.deadlines.insert(id, at);
        id
    }

    /// Cancel a task. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(at) => self.queue.remove(&(at, id)).is_some(),
            None => false,
        }
    }

    /// Check if a task is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Deadline of a pending task.
    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        self.deadlines.get(&id).copied()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerId, TimerTask)> {
        let (&(at, id), _) = self.queue.iter().next()?;
        if at > now {
            return None;
        }
        self.deadlines.remove(&id);
        self.queue.remove(&(at, id)).map(|task| (id, task))
    }

    /// Count pending tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn round_task(key: &'static str) -> TimerTask {
        TimerTask::Round {
            lobby_code: "ACDE".to_string(),
            round_id: 1,
            key,
        }
    }

    #[test]
    fn test_pop_in_deadline_order() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();

        let late = scheduler.schedule(t0 + Duration::from_secs(5), round_task("late"));
        let early = scheduler.schedule(t0 + Duration::from_secs(1), round_task("early"));

        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_secs(1)));
        assert!(scheduler.pop_due(t0).is_none());

        let (id, task) = scheduler.pop_due(t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(id, early);
        assert_eq!(task, round_task("early"));

        let (id, _) = scheduler.pop_due(t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(id, late);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();

        let id = scheduler.schedule(t0, round_task("x"));
        assert!(scheduler.is_pending(id));
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.pop_due(t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_fired_task_is_not_pending() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();

        let id = scheduler.schedule(t0, round_task("x"));
        scheduler.pop_due(t0).unwrap();

        assert!(!scheduler.is_pending(id));
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn test_same_deadline_keeps_schedule_order() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();

        let a = scheduler.schedule(t0, round_task("a"));
        let b = scheduler.schedule(t0, round_task("b"));

        assert_eq!(scheduler.pop_due(t0).unwrap().0, a);
        assert_eq!(scheduler.pop_due(t0).unwrap().0, b);
    }
}
