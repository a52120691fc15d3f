use crate::{
  entity::discount_terms,
  prelude::*,
  sv::{
    identity::validate_code,
    terms::{DiscountTerms, DiscountTermsPayload},
  },
};

/// Administrative access to the locally served discount terms.
pub struct Catalog<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Catalog<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn by_code(
    &self,
    code: &str,
  ) -> Result<Option<discount_terms::Model>> {
    Ok(discount_terms::Entity::find_by_id(code).one(self.db).await?)
  }

  /// Insert or replace the terms for `code`, reactivating it.
  pub async fn upsert(
    &self,
    code: &str,
    payload: DiscountTermsPayload,
  ) -> Result<discount_terms::Model> {
    let code = validate_code(code)?;
    // refuse what the resolver would refuse
    DiscountTerms::from_payload(code, payload.clone())?;

    let expires_at = payload.expires_at.map(|at| at.naive_utc());

    let model = match discount_terms::Entity::find_by_id(code)
      .one(self.db)
      .await?
    {
      Some(existing) => {
        discount_terms::ActiveModel {
          discount_type: Set(payload.kind),
          value: Set(payload.value),
          min_order: Set(payload.min_order),
          max_amount: Set(payload.max_amount),
          expires_at: Set(expires_at),
          description: Set(payload.description),
          is_active: Set(true),
          ..existing.into()
        }
        .update(self.db)
        .await?
      }
      None => {
        discount_terms::ActiveModel {
          code: Set(code.to_string()),
          discount_type: Set(payload.kind),
          value: Set(payload.value),
          min_order: Set(payload.min_order),
          max_amount: Set(payload.max_amount),
          expires_at: Set(expires_at),
          description: Set(payload.description),
          is_active: Set(true),
          created_at: Set(now()),
        }
        .insert(self.db)
        .await?
      }
    };

    info!("terms for `{}` saved ({:?})", model.code, model.discount_type);
    Ok(model)
  }

  pub async fn deactivate(&self, code: &str) -> Result<()> {
    let model = discount_terms::Entity::find_by_id(code)
      .one(self.db)
      .await?
      .ok_or(Rejection::NotFound)?;

    discount_terms::ActiveModel { is_active: Set(false), ..model.into() }
      .update(self.db)
      .await?;

    info!("terms for `{code}` deactivated");
    Ok(())
  }

  pub async fn active(&self) -> Result<Vec<discount_terms::Model>> {
    Ok(
      discount_terms::Entity::find()
        .filter(discount_terms::Column::IsActive.eq(true))
        .all(self.db)
        .await?,
    )
  }
}
