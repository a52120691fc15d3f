use crate::prelude::*;

/// Minor units per currency unit.
pub const CENTS: i64 = 100;

pub fn format_duration(duration: TimeDelta) -> String {
  format!(
    "{}d {}h {}m",
    duration.num_days(),
    duration.num_hours() % 24,
    duration.num_minutes() % 60
  )
}

pub fn format_money(cents: i64, symbol: &str) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let cents = cents.abs();
  format!("{sign}{symbol}{}.{:02}", cents / CENTS, cents % CENTS)
}

/// `10.0` -> `10`, `12.5` -> `12.5`
pub fn format_percent(percent: f64) -> String {
  if percent.fract() == 0.0 {
    format!("{percent:.0}")
  } else {
    let s = format!("{percent:.2}");
    s.trim_end_matches('0').to_string()
  }
}

/// Decimal currency units from the wire into minor units.
pub fn to_minor(value: f64) -> i64 {
  (value * CENTS as f64).round() as i64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_money() {
    assert_eq!(format_money(500, "$"), "$5.00");
    assert_eq!(format_money(1999, "€"), "€19.99");
    assert_eq!(format_money(-5, "$"), "-$0.05");
  }

  #[test]
  fn test_format_percent() {
    assert_eq!(format_percent(10.0), "10");
    assert_eq!(format_percent(12.5), "12.5");
    assert_eq!(format_percent(33.33), "33.33");
  }

  #[test]
  fn test_format_duration() {
    let delta = TimeDelta::seconds(86_400 + 2 * 3600 + 3 * 60 + 4);
    assert_eq!(format_duration(delta), "1d 2h 3m");
    assert_eq!(format_duration(TimeDelta::seconds(59)), "0d 0h 0m");
  }

  #[test]
  fn test_minor_units() {
    assert_eq!(to_minor(19.99), 1999);
    assert_eq!(to_minor(0.1 + 0.2), 30);
  }
}
