use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualificationProgress {
  pub cart_total: i64,
  pub min_order: i64,
  pub remaining: i64,
  pub percent: f64,
  pub qualified: bool,
}

impl QualificationProgress {
  pub fn compute(cart_total: i64, min_order: i64) -> Self {
    let cart_total = cart_total.max(0);
    let remaining = (min_order - cart_total).max(0);
    let percent = if min_order <= 0 {
      100.0
    } else {
      (cart_total as f64 / min_order as f64 * 100.0).min(100.0)
    };

    Self { cart_total, min_order, remaining, percent, qualified: remaining == 0 }
  }
}

/// Tracks progress toward a minimum order.
/// The last value only tells the renderer whether to repaint.
#[derive(Debug, Clone, Default)]
pub struct QualificationTracker {
  min_order: i64,
  last: Option<QualificationProgress>,
  changed: bool,
}

impl QualificationTracker {
  pub fn new(min_order: Option<i64>) -> Self {
    Self { min_order: min_order.unwrap_or(0), last: None, changed: false }
  }

  pub fn update(&mut self, cart_total: i64) -> QualificationProgress {
    let progress = QualificationProgress::compute(cart_total, self.min_order);
    self.changed = self.last != Some(progress);
    self.last = Some(progress);
    progress
  }

  pub fn last(&self) -> Option<QualificationProgress> {
    self.last
  }

  /// Whether the latest `update` produced a different value.
  pub fn changed(&self) -> bool {
    self.changed
  }
}
