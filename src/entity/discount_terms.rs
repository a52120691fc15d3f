use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
  #[sea_orm(string_value = "percentage")]
  Percentage,
  #[sea_orm(string_value = "fixed")]
  Fixed,
}

/// Terms served by the local pricing authority.
/// Amounts keep the authority's decimal shape (currency units, not cents).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_terms")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub code: String,
  pub discount_type: DiscountType,
  pub value: f64,
  pub min_order: Option<f64>,
  pub max_amount: Option<f64>,
  pub expires_at: Option<DateTime>,
  pub description: Option<String>,
  pub is_active: bool,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
