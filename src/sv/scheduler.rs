use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
  /// Hides the success message
  AutoHide,
  /// Fires when the discount terms expire
  Countdown,
}

/// Deadline timers of one controller. Driven by an external tick, so
/// dropping the controller drops every timer with it.
#[derive(Debug, Default)]
pub struct Scheduler {
  timers: HashMap<TimerKind, DateTime>,
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// Arms `kind`, replacing any previous deadline.
  pub fn schedule(&mut self, kind: TimerKind, deadline: DateTime) {
    trace!("timer {kind:?} armed for {deadline}");
    self.timers.insert(kind, deadline);
  }

  pub fn cancel(&mut self, kind: TimerKind) -> bool {
    self.timers.remove(&kind).is_some()
  }

  pub fn cancel_all(&mut self) {
    self.timers.clear();
  }

  pub fn is_armed(&self, kind: TimerKind) -> bool {
    self.timers.contains_key(&kind)
  }

  pub fn deadline(&self, kind: TimerKind) -> Option<DateTime> {
    self.timers.get(&kind).copied()
  }

  /// Removes and returns the timers whose deadline has passed, earliest
  /// first.
  pub fn due(&mut self, now: DateTime) -> Vec<TimerKind> {
    let mut due: Vec<_> = self
      .timers
      .iter()
      .filter(|(_, deadline)| **deadline <= now)
      .map(|(kind, deadline)| (*deadline, *kind))
      .collect();
    due.sort_by_key(|(deadline, _)| *deadline);

    for (_, kind) in &due {
      self.timers.remove(kind);
    }
    due.into_iter().map(|(_, kind)| kind).collect()
  }

  pub fn len(&self) -> usize {
    self.timers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timers.is_empty()
  }
}
