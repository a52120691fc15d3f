use serde::{Deserialize, Serialize};

use crate::{
  entity::{DiscountType, discount_terms},
  prelude::*,
  utils::{self, format_money, format_percent},
};

/// Terms as the pricing authority sends them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountTermsPayload {
  #[serde(rename = "type")]
  pub kind: DiscountType,
  pub value: f64,
  #[serde(default)]
  pub min_order: Option<f64>,
  #[serde(default)]
  pub max_amount: Option<f64>,
  #[serde(default)]
  pub expires_at: Option<chrono::DateTime<Utc>>,
  #[serde(default)]
  pub description: Option<String>,
}

impl From<discount_terms::Model> for DiscountTermsPayload {
  fn from(model: discount_terms::Model) -> Self {
    Self {
      kind: model.discount_type,
      value: model.value,
      min_order: model.min_order,
      max_amount: model.max_amount,
      expires_at: model.expires_at.map(|at| Utc.from_utc_datetime(&at)),
      description: model.description,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
  /// `percent` in `[0, 100]`; `max_amount` caps the resulting discount
  Percentage { percent: f64, max_amount: Option<i64> },
  Fixed { amount: i64 },
}

/// Validated terms. Money is held in minor units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountTerms {
  pub affiliate_code: String,
  pub kind: DiscountKind,
  pub min_order: Option<i64>,
  pub expires_at: Option<DateTime>,
  pub description: Option<String>,
}

fn amount(
  field: &str,
  value: Option<f64>,
) -> Result<Option<i64>, Rejection> {
  match value {
    None => Ok(None),
    Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(utils::to_minor(v))),
    Some(v) => Err(Rejection::Malformed(format!("{field} = {v}"))),
  }
}

impl DiscountTerms {
  pub fn from_payload(
    code: &str,
    payload: DiscountTermsPayload,
  ) -> Result<Self, Rejection> {
    let min_order = amount("minOrder", payload.min_order)?;
    let max_amount = amount("maxAmount", payload.max_amount)?;

    let kind = match payload.kind {
      DiscountType::Percentage => {
        if !payload.value.is_finite() || !(0.0..=100.0).contains(&payload.value)
        {
          return Err(Rejection::Malformed(format!(
            "percentage value {} outside [0, 100]",
            payload.value
          )));
        }
        DiscountKind::Percentage { percent: payload.value, max_amount }
      }
      DiscountType::Fixed => {
        if max_amount.is_some() {
          debug!("ignoring maxAmount on fixed discount `{code}`");
        }
        let amount = amount("value", Some(payload.value))?.unwrap_or(0);
        DiscountKind::Fixed { amount }
      }
    };

    Ok(Self {
      affiliate_code: code.to_string(),
      kind,
      min_order,
      expires_at: payload.expires_at.map(|at| at.naive_utc()),
      description: payload.description.filter(|d| !d.trim().is_empty()),
    })
  }

  pub fn is_expired(&self, now: DateTime) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }

  pub fn time_left(&self, now: DateTime) -> Option<TimeDelta> {
    self.expires_at.map(|at| (at - now).max(TimeDelta::zero()))
  }

  pub fn qualifies(&self, cart_total: i64) -> bool {
    self.min_order.is_none_or(|min| cart_total >= min)
  }

  /// Discount granted on `cart_total`, never more than the cart itself.
  pub fn discount_for(&self, cart_total: i64) -> i64 {
    let cart_total = cart_total.max(0);
    if !self.qualifies(cart_total) {
      return 0;
    }

    let discount = match self.kind {
      DiscountKind::Percentage { percent, max_amount } => {
        let raw = (cart_total as f64 * percent / 100.0).round() as i64;
        max_amount.map_or(raw, |cap| raw.min(cap))
      }
      DiscountKind::Fixed { amount } => amount,
    };

    discount.clamp(0, cart_total)
  }

  pub fn label(&self, symbol: &str) -> String {
    match self.kind {
      DiscountKind::Percentage { percent, max_amount: Some(cap) } => format!(
        "{}% off (up to {})",
        format_percent(percent),
        format_money(cap, symbol)
      ),
      DiscountKind::Percentage { percent, max_amount: None } => {
        format!("{}% off", format_percent(percent))
      }
      DiscountKind::Fixed { amount } => {
        format!("{} off", format_money(amount, symbol))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn payload(kind: DiscountType, value: f64) -> DiscountTermsPayload {
    DiscountTermsPayload {
      kind,
      value,
      min_order: None,
      max_amount: None,
      expires_at: None,
      description: None,
    }
  }

  #[test]
  fn test_wire_format() {
    let raw = r#"{"type":"percentage","value":10,"minOrder":50,"maxAmount":20.5,"expiresAt":"2030-01-01T00:00:00Z","description":"Spring"}"#;
    let payload: DiscountTermsPayload = json::from_str(raw).unwrap();
    let terms = DiscountTerms::from_payload("SAVE10", payload).unwrap();

    assert_eq!(
      terms.kind,
      DiscountKind::Percentage { percent: 10.0, max_amount: Some(2050) }
    );
    assert_eq!(terms.min_order, Some(5000));
    assert_eq!(terms.description.as_deref(), Some("Spring"));
    assert!(terms.expires_at.is_some());
  }

  #[test]
  fn test_percentage_out_of_range_is_malformed() {
    for value in [-1.0, 100.5, f64::NAN] {
      let err =
        DiscountTerms::from_payload("X", payload(DiscountType::Percentage, value))
          .unwrap_err();
      assert!(matches!(err, Rejection::Malformed(_)));
    }
  }

  #[test]
  fn test_negative_fixed_is_malformed() {
    let err = DiscountTerms::from_payload("X", payload(DiscountType::Fixed, -5.0))
      .unwrap_err();
    assert!(matches!(err, Rejection::Malformed(_)));
  }

  #[test]
  fn test_fixed_ignores_max_amount() {
    let mut p = payload(DiscountType::Fixed, 5.0);
    p.max_amount = Some(1.0);
    let terms = DiscountTerms::from_payload("X", p).unwrap();
    assert_eq!(terms.kind, DiscountKind::Fixed { amount: 500 });
  }

  #[test]
  fn test_percentage_discount_is_capped() {
    let mut p = payload(DiscountType::Percentage, 50.0);
    p.max_amount = Some(20.0);
    let terms = DiscountTerms::from_payload("X", p).unwrap();

    assert_eq!(terms.discount_for(2000), 1000);
    assert_eq!(terms.discount_for(10_000), 2000);
  }

  #[test]
  fn test_fixed_discount_never_exceeds_cart() {
    let terms =
      DiscountTerms::from_payload("X", payload(DiscountType::Fixed, 15.0))
        .unwrap();
    assert_eq!(terms.discount_for(1000), 1000);
    assert_eq!(terms.discount_for(5000), 1500);
    assert_eq!(terms.discount_for(-10), 0);
  }

  #[test]
  fn test_min_order_gates_discount() {
    let mut p = payload(DiscountType::Percentage, 10.0);
    p.min_order = Some(50.0);
    let terms = DiscountTerms::from_payload("SAVE10", p).unwrap();

    assert_eq!(terms.discount_for(3000), 0);
    assert_eq!(terms.discount_for(6000), 600);
  }

  #[test]
  fn test_labels() {
    let mut p = payload(DiscountType::Percentage, 12.5);
    p.max_amount = Some(20.0);
    let capped = DiscountTerms::from_payload("X", p).unwrap();
    assert_eq!(capped.label("$"), "12.5% off (up to $20.00)");

    let fixed =
      DiscountTerms::from_payload("X", payload(DiscountType::Fixed, 5.0))
        .unwrap();
    assert_eq!(fixed.label("$"), "$5.00 off");
  }

  #[test]
  fn test_expiry() {
    let now = now();
    let mut p = payload(DiscountType::Fixed, 5.0);
    p.expires_at = Some(Utc.from_utc_datetime(&(now - TimeDelta::seconds(1))));
    let terms = DiscountTerms::from_payload("X", p).unwrap();

    assert!(terms.is_expired(now));
    assert_eq!(terms.time_left(now), Some(TimeDelta::zero()));
  }
}
