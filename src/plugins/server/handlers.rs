use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::visitor::{Admin, Visitor};
use crate::{
  entity::discount_terms,
  prelude::*,
  state::AppState,
  sv::{
    identity::validate_code,
    presentation::{self, CopyOutcome, Referral, Surface, View},
    terms::{DiscountTerms, DiscountTermsPayload},
  },
  utils,
};

#[derive(Serialize)]
pub struct Status {
  success: bool,
  msg: Option<String>,
}

impl Status {
  fn ok() -> Json<Self> {
    Json(Self { success: true, msg: None })
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::Validation(_) => StatusCode::BAD_REQUEST,
      Error::Rejected(Rejection::NotFound) => StatusCode::NOT_FOUND,
      Error::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
      Error::Network(_) => StatusCode::BAD_GATEWAY,
      Error::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
      Error::Unauthorized => StatusCode::UNAUTHORIZED,
      Error::Db(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
      error!("request failed: {self}");
    } else {
      debug!("request refused: {self}");
    }

    let msg = match self {
      Error::Unauthorized => "unauthorized",
      other => other.category().user_message(),
    };
    (status, Json(Status { success: false, msg: Some(msg.into()) }))
      .into_response()
  }
}

/// Longest code accepted from a browser.
pub const MAX_CODE_LEN: usize = 64;

/// Form and query input: surrounding whitespace dropped, length capped.
/// The pattern itself is checked by the identity store.
fn form_code(raw: &str) -> Result<&str, ValidationError> {
  let code = raw.trim();
  if code.chars().count() > MAX_CODE_LEN {
    return Err(ValidationError::TooLong(MAX_CODE_LEN));
  }
  Ok(code)
}

async fn render(app: &AppState, visitor: &Visitor) -> View {
  app.controller(&visitor.id).lock().await.view(now())
}

pub async fn health() -> &'static str {
  "ok"
}

#[derive(Deserialize)]
pub struct ViewQuery {
  #[serde(rename = "ref")]
  code: Option<String>,
  src: Option<String>,
}

pub async fn view(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
  Query(query): Query<ViewQuery>,
) -> Response {
  let referral = query
    .code
    .and_then(|raw| match form_code(&raw) {
      Ok("") => None,
      Ok(code) => Some(code.to_string()),
      Err(err) => {
        debug!("ignoring referral parameter: {err}");
        None
      }
    })
    .map(|code| Referral { code, source_url: query.src });

  presentation::open(&app.controller(&visitor.id), referral).await;
  visitor.reply(&app, Json(render(&app, &visitor).await))
}

#[derive(Deserialize)]
pub struct SubmitReq {
  code: String,
  source_url: Option<String>,
}

pub async fn submit_code(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
  Json(req): Json<SubmitReq>,
) -> Result<Response> {
  let code = form_code(&req.code)?;
  let ctrl = app.controller(&visitor.id);
  presentation::submit(&ctrl, code, req.source_url).await;
  Ok(visitor.reply(&app, Json(render(&app, &visitor).await)))
}

pub async fn change_code(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
) -> Response {
  app.controller(&visitor.id).lock().await.change_code(now()).await;
  visitor.reply(&app, Json(render(&app, &visitor).await))
}

#[derive(Deserialize)]
pub struct DismissReq {
  surface: String,
}

pub async fn dismiss(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
  Json(req): Json<DismissReq>,
) -> Result<Response> {
  let surface: Surface = req.surface.parse()?;
  app.controller(&visitor.id).lock().await.dismiss(surface, now()).await?;
  Ok(visitor.reply(&app, Json(render(&app, &visitor).await)))
}

pub async fn interact(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
) -> Response {
  app.controller(&visitor.id).lock().await.interact(now());
  visitor.reply(&app, Json(render(&app, &visitor).await))
}

#[derive(Deserialize)]
pub struct CartReq {
  total: f64,
}

pub async fn cart(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
  Json(req): Json<CartReq>,
) -> Result<Response> {
  if !req.total.is_finite() || req.total < 0.0 {
    return Err(ValidationError::InvalidAmount(req.total.to_string()).into());
  }

  let total = utils::to_minor(req.total);
  app.controller(&visitor.id).lock().await.cart_updated(total, now());
  Ok(visitor.reply(&app, Json(render(&app, &visitor).await)))
}

#[derive(Deserialize)]
pub struct CopyReq {
  outcome: CopyOutcome,
}

#[derive(Serialize)]
pub struct CopyResp {
  text: String,
}

pub async fn copy(
  State(app): State<Arc<AppState>>,
  visitor: Visitor,
  Json(req): Json<CopyReq>,
) -> Result<Response> {
  let ctrl = app.controller(&visitor.id);
  let text = ctrl.lock().await.copy_reported(req.outcome, now())?.to_string();
  Ok(visitor.reply(&app, Json(CopyResp { text })))
}

pub async fn terms(
  State(app): State<Arc<AppState>>,
  Path(code): Path<String>,
) -> Result<Json<DiscountTerms>> {
  let code = validate_code(form_code(&code)?)?;
  app
    .engine
    .resolver
    .resolve(code)
    .await
    .map(Json)
    .ok_or(Rejection::NotFound.into())
}

#[derive(Deserialize)]
pub struct TermsReq {
  code: String,
  #[serde(flatten)]
  terms: DiscountTermsPayload,
}

pub async fn list_terms(
  _: Admin,
  State(app): State<Arc<AppState>>,
) -> Result<Json<Vec<discount_terms::Model>>> {
  Ok(Json(app.sv().catalog.active().await?))
}

pub async fn upsert_terms(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Json(req): Json<TermsReq>,
) -> Result<Json<discount_terms::Model>> {
  let model = app.sv().catalog.upsert(&req.code, req.terms).await?;
  app.engine.resolver.invalidate(&model.code);
  Ok(Json(model))
}

pub async fn deactivate_terms(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Path(code): Path<String>,
) -> Result<Json<Status>> {
  app.sv().catalog.deactivate(&code).await?;
  app.engine.resolver.invalidate(&code);
  Ok(Status::ok())
}

pub async fn clear_cache(
  _: Admin,
  State(app): State<Arc<AppState>>,
) -> Json<Status> {
  app.engine.resolver.clear();
  Status::ok()
}
