//! Presentation state machine.
//!
//! One [`Controller`] per visitor decides which surface is on screen. Every
//! browser event maps to exactly one input method here, and every
//! transition emits exactly one `{surface}_{verb}` telemetry event.
//!
//! Authority calls happen outside the controller: an input that needs terms
//! hands out a [`Ticket`], the caller resolves it with the lock released, and
//! feeds the outcome back through [`Controller::complete`]. Only the newest
//! ticket is honoured.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
  prelude::*,
  sv::{
    Engine,
    identity::{AffiliateIdentity, Durability, validate_code},
    qualification::{QualificationProgress, QualificationTracker},
    scheduler::{Scheduler, TimerKind},
    terms::DiscountTerms,
  },
  utils::{format_duration, format_money},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
  None,
  Popup,
  Banner,
  SuccessMessage,
}

impl Surface {
  pub fn as_str(self) -> &'static str {
    match self {
      Surface::None => "none",
      Surface::Popup => "popup",
      Surface::Banner => "banner",
      Surface::SuccessMessage => "success_message",
    }
  }
}

impl FromStr for Surface {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "popup" => Ok(Surface::Popup),
      "banner" => Ok(Surface::Banner),
      "success_message" => Ok(Surface::SuccessMessage),
      other => Err(ValidationError::UnknownSurface(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Idle,
  CodeEntry,
  Resolving,
  Success,
  Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
  Submit,
  Restore,
}

/// An outstanding authority request.
#[derive(Debug, Clone)]
pub struct Ticket {
  seq: u64,
  code: String,
  source_url: Option<String>,
  intent: Intent,
}

impl Ticket {
  pub fn code(&self) -> &str {
    &self.code
  }
}

/// Code captured from a `?ref=` link.
#[derive(Debug, Clone)]
pub struct Referral {
  pub code: String,
  pub source_url: Option<String>,
}

/// Result of the browser's clipboard attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
  Copied,
  /// Async clipboard refused, the synchronous fallback worked
  CopiedWithFallback,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscountView {
  pub label: String,
  pub description: Option<String>,
  pub min_order: Option<String>,
  /// Discount on the current cart, when a cart total is known
  pub amount_off: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Countdown {
  pub seconds: i64,
  pub display: String,
}

/// Everything a template needs to render the discount UI.
#[derive(Debug, Clone, Serialize)]
pub struct View {
  pub surface: Surface,
  pub phase: Phase,
  pub code: Option<String>,
  pub error: Option<Category>,
  pub message: Option<&'static str>,
  pub warning: Option<&'static str>,
  pub discount: Option<DiscountView>,
  pub qualification: Option<QualificationProgress>,
  pub countdown: Option<Countdown>,
  pub hides_in_ms: Option<i64>,
  pub visible_since: Option<DateTime>,
}

pub struct Controller {
  visitor: String,
  engine: Arc<Engine>,
  phase: Phase,
  failure: Option<Category>,
  warning: Option<Category>,
  identity: Option<AffiliateIdentity>,
  terms: Option<DiscountTerms>,
  dismissed: HashSet<Surface>,
  tracker: QualificationTracker,
  cart_total: Option<i64>,
  scheduler: Scheduler,
  shown: Surface,
  visible_since: Option<DateTime>,
  issued: u64,
  pending: Option<u64>,
  last_active: Instant,
}

impl Controller {
  pub fn new(visitor: impl Into<String>, engine: Arc<Engine>) -> Self {
    Self {
      visitor: visitor.into(),
      engine,
      phase: Phase::Idle,
      failure: None,
      warning: None,
      identity: None,
      terms: None,
      dismissed: HashSet::new(),
      tracker: QualificationTracker::default(),
      cart_total: None,
      scheduler: Scheduler::new(),
      shown: Surface::None,
      visible_since: None,
      issued: 0,
      pending: None,
      last_active: Instant::now(),
    }
  }

  pub fn engine(&self) -> &Arc<Engine> {
    &self.engine
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn code(&self) -> Option<&str> {
    self.identity.as_ref().map(|i| i.code.as_str())
  }

  pub fn terms(&self) -> Option<&DiscountTerms> {
    self.terms.as_ref()
  }

  pub fn failure(&self) -> Option<Category> {
    self.failure
  }

  pub fn live_timers(&self) -> usize {
    self.scheduler.len()
  }

  pub fn idle_for(&self) -> Duration {
    self.last_active.elapsed()
  }

  fn touch(&mut self) {
    self.last_active = Instant::now();
  }

  /// Dismissal scope: the current code, or the empty string when anonymous.
  fn scope(&self) -> String {
    self.code().unwrap_or_default().to_string()
  }

  fn banner_eligible(&self, now: DateTime) -> bool {
    self.identity.is_some()
      && self.terms.as_ref().is_some_and(|t| !t.is_expired(now))
      && !self.dismissed.contains(&Surface::Banner)
  }

  fn surface_at(&self, now: DateTime) -> Surface {
    match self.phase {
      Phase::Success => Surface::SuccessMessage,
      Phase::CodeEntry | Phase::Resolving => Surface::Popup,
      Phase::Idle | Phase::Hidden if self.banner_eligible(now) => {
        Surface::Banner
      }
      Phase::Idle | Phase::Hidden => Surface::None,
    }
  }

  pub fn surface(&self) -> Surface {
    self.surface_at(now())
  }

  /// Surface a user action is attributed to. Actions taken while nothing
  /// is on screen come from the banner's controls.
  fn acting_surface(&self, now: DateTime) -> Surface {
    match self.surface_at(now) {
      Surface::None => Surface::Banner,
      surface => surface,
    }
  }

  fn emit(&self, surface: Surface, verb: &str, mut data: json::Value) {
    if let Some(map) = data.as_object_mut() {
      map.insert("visitor".into(), self.visitor.clone().into());
      if let Some(code) = self.code() {
        map.entry("code").or_insert_with(|| code.into());
      }
    }
    self.engine.telemetry.record(format!("{}_{verb}", surface.as_str()), data);
  }

  fn note_durability(&mut self, durability: Durability) {
    if durability == Durability::MemoryOnly {
      self.warning = Some(Category::Persistence);
    }
  }

  fn issue(
    &mut self,
    code: String,
    source_url: Option<String>,
    intent: Intent,
  ) -> Ticket {
    self.issued += 1;
    self.pending = Some(self.issued);
    Ticket { seq: self.issued, code, source_url, intent }
  }

  fn adopt(&mut self, terms: DiscountTerms) {
    self.tracker = QualificationTracker::new(terms.min_order);
    if let Some(total) = self.cart_total {
      self.tracker.update(total);
    }
    match terms.expires_at {
      Some(at) => self.scheduler.schedule(TimerKind::Countdown, at),
      None => {
        self.scheduler.cancel(TimerKind::Countdown);
      }
    }
    self.terms = Some(terms);
  }

  fn drop_terms(&mut self) {
    if let Some(terms) = self.terms.take() {
      self.engine.resolver.invalidate(&terms.affiliate_code);
    }
    self.tracker = QualificationTracker::default();
    self.scheduler.cancel(TimerKind::Countdown);
  }

  /// Re-derives timers and visibility after every transition. A surface
  /// that is gone takes its timers with it.
  fn settle(&mut self, now: DateTime) {
    let surface = self.surface_at(now);
    if surface != Surface::SuccessMessage {
      self.scheduler.cancel(TimerKind::AutoHide);
    }
    if surface == Surface::None && !self.scheduler.is_empty() {
      trace!("visitor {} has nothing on screen, dropping timers", self.visitor);
      self.scheduler.cancel_all();
    }
    if surface != self.shown {
      self.shown = surface;
      self.visible_since = (surface != Surface::None).then_some(now);
    }
  }

  fn fail(&mut self, category: Category, detail: &str, now: DateTime) {
    self.phase = Phase::CodeEntry;
    self.failure = Some(category);
    self.pending = None;
    self.emit(
      Surface::Popup,
      "submit_failure",
      json::json!({ "category": category.as_str() }),
    );
    self.engine.telemetry.record_error(category, detail);
    self.settle(now);
  }

  /// Page load. Captures a `?ref=` code when present and returns a ticket
  /// when stored terms must be restored for the banner.
  pub async fn open(
    &mut self,
    referral: Option<Referral>,
    now: DateTime,
  ) -> Option<Ticket> {
    self.touch();
    let engine = self.engine.clone();

    if self.identity.is_none() {
      self.identity = engine.identity.current(&self.visitor).await;
    }

    if let Some(referral) = referral {
      match validate_code(&referral.code) {
        Ok(code) if self.code() != Some(code) => {
          match engine
            .identity
            .set_code(&self.visitor, code, referral.source_url, now)
            .await
          {
            Ok((identity, durability)) => {
              info!("visitor {} captured code `{code}`", self.visitor);
              self.drop_terms();
              self.identity = Some(identity);
              self.note_durability(durability);
              self.failure = None;
              self.phase = Phase::Idle;
            }
            Err(err) => warn!("failed to capture referral `{code}`: {err}"),
          }
        }
        Ok(_) => {}
        Err(err) => debug!("ignoring referral parameter: {err}"),
      }
    }

    let scope = self.scope();
    self.dismissed = engine.identity.dismissed(&self.visitor, &scope).await;

    let ticket = match self.identity.clone() {
      None => {
        if matches!(self.phase, Phase::Idle | Phase::Hidden)
          && !self.dismissed.contains(&Surface::Popup)
        {
          self.phase = Phase::CodeEntry;
          self.emit(Surface::Popup, "view", json::json!({}));
        }
        None
      }
      Some(_) if self.terms.as_ref().is_some_and(|t| !t.is_expired(now)) => {
        None
      }
      Some(_) if self.phase == Phase::Resolving => None,
      Some(identity) => Some(self.issue(identity.code, None, Intent::Restore)),
    };

    self.settle(now);
    ticket
  }

  /// `CodeEntry -> Resolving`. A malformed code fails locally and never
  /// produces a ticket.
  pub fn begin_submit(
    &mut self,
    code: &str,
    source_url: Option<String>,
    now: DateTime,
  ) -> Option<Ticket> {
    self.touch();

    match validate_code(code) {
      Err(err) => {
        self.fail(Category::Validation, &err.to_string(), now);
        None
      }
      Ok(code) => {
        let code = code.to_string();
        self.phase = Phase::Resolving;
        self.failure = None;
        self.emit(Surface::Popup, "submit", json::json!({ "code": code }));
        let ticket = self.issue(code, source_url, Intent::Submit);
        self.settle(now);
        Some(ticket)
      }
    }
  }

  /// Applies an authority answer. Answers to superseded tickets are dropped.
  pub async fn complete(
    &mut self,
    ticket: Ticket,
    outcome: Result<DiscountTerms>,
    now: DateTime,
  ) {
    if self.pending != Some(ticket.seq) {
      debug!(
        "discarding stale answer for `{}` (seq {}, latest {})",
        ticket.code, ticket.seq, self.issued
      );
      return;
    }
    self.pending = None;

    // the clock may have passed the expiry while the request was in flight
    let outcome = outcome.and_then(|terms| {
      if terms.is_expired(now) {
        Err(Rejection::Expired.into())
      } else {
        Ok(terms)
      }
    });

    match (ticket.intent, outcome) {
      (Intent::Submit, Ok(terms)) => {
        let engine = self.engine.clone();
        let previous = self.identity.as_ref().map(|i| i.code.clone());

        let (identity, durability) = match engine
          .identity
          .set_code(&self.visitor, &ticket.code, ticket.source_url, now)
          .await
        {
          Ok(stored) => stored,
          Err(err) => return self.fail(err.category(), &err.to_string(), now),
        };

        if let Some(previous) = previous.filter(|p| *p != identity.code) {
          engine.identity.forget_dismissed(&self.visitor, &previous).await;
          engine.resolver.invalidate(&previous);
        }

        self.dismissed =
          engine.identity.dismissed(&self.visitor, &identity.code).await;
        self.identity = Some(identity);
        self.note_durability(durability);
        self.failure = None;
        self.adopt(terms);
        self.phase = Phase::Success;

        let deadline = TimeDelta::from_std(engine.auto_hide)
          .ok()
          .and_then(|delay| now.checked_add_signed(delay))
          .unwrap_or(DateTime::MAX);
        self.scheduler.schedule(TimerKind::AutoHide, deadline);

        self.emit(Surface::Popup, "submit_success", json::json!({}));
      }
      (Intent::Submit, Err(err)) => {
        return self.fail(err.category(), &err.to_string(), now);
      }
      (Intent::Restore, Ok(terms)) => {
        self.adopt(terms);
        if self.banner_eligible(now) {
          self.emit(Surface::Banner, "view", json::json!({}));
        }
      }
      (Intent::Restore, Err(err)) => {
        let category = err.category();
        self.drop_terms();
        self.engine.telemetry.record_error(category, &err.to_string());

        if category == Category::Rejected
          && !self.dismissed.contains(&Surface::Popup)
        {
          // the stored code went bad, ask for another one
          self.phase = Phase::CodeEntry;
          self.failure = Some(category);
          let data = json::json!({ "reason": "rejected" });
          self.emit(Surface::Popup, "view", data);
        } else {
          self.emit(
            Surface::Banner,
            "suppress",
            json::json!({ "category": category.as_str() }),
          );
        }
      }
    }

    self.settle(now);
  }

  /// Hides `surface` and remembers it for the current code.
  pub async fn dismiss(
    &mut self,
    surface: Surface,
    now: DateTime,
  ) -> Result<()> {
    self.touch();
    if surface == Surface::None {
      return Err(ValidationError::UnknownSurface("none".into()).into());
    }

    self.dismissed.insert(surface);
    let scope = self.scope();
    let durability = self
      .engine
      .identity
      .save_dismissed(&self.visitor, &scope, &self.dismissed)
      .await?;
    self.note_durability(durability);

    if self.surface_at(now) == surface {
      match surface {
        Surface::Popup => {
          self.phase = Phase::Hidden;
          self.pending = None;
          self.failure = None;
        }
        Surface::SuccessMessage => self.phase = Phase::Hidden,
        Surface::Banner | Surface::None => {}
      }
    }

    self.emit(surface, "dismiss", json::json!({}));
    self.settle(now);
    Ok(())
  }

  /// Hover or focus on the success message keeps it on screen.
  pub fn interact(&mut self, now: DateTime) {
    self.touch();
    if self.phase == Phase::Success
      && self.scheduler.is_armed(TimerKind::AutoHide)
    {
      self.scheduler.cancel(TimerKind::AutoHide);
      self.emit(Surface::SuccessMessage, "hold", json::json!({}));
    }
    self.settle(now);
  }

  /// "Change Code": forget the identity and reopen the popup.
  pub async fn change_code(&mut self, now: DateTime) {
    self.touch();
    let surface = self.acting_surface(now);
    let engine = self.engine.clone();

    if let Some(identity) = self.identity.take() {
      engine.identity.clear(&self.visitor, &identity.code).await;
      engine.resolver.invalidate(&identity.code);
    }
    self.drop_terms();
    self.scheduler.cancel_all();
    self.pending = None;
    self.failure = None;
    self.warning = None;
    self.dismissed = engine.identity.dismissed(&self.visitor, "").await;
    self.phase = Phase::CodeEntry;

    self.emit(surface, "change_code", json::json!({}));
    self.settle(now);
  }

  /// Cart platform reported a new total (minor units).
  pub fn cart_updated(
    &mut self,
    total: i64,
    now: DateTime,
  ) -> Option<QualificationProgress> {
    self.touch();
    let total = total.max(0);
    self.cart_total = Some(total);
    let progress = self.terms.is_some().then(|| self.tracker.update(total));
    if progress.is_some() && self.tracker.changed() {
      trace!("visitor {} qualification now {:?}", self.visitor, progress);
    }
    self.settle(now);
    progress
  }

  pub fn copy_reported(
    &mut self,
    outcome: CopyOutcome,
    now: DateTime,
  ) -> Result<&str> {
    self.touch();
    if self.identity.is_none() {
      return Err(ValidationError::Empty.into());
    }

    let surface = self.acting_surface(now);
    match outcome {
      CopyOutcome::Failed => {
        self.emit(surface, "copy_failure", json::json!({}));
      }
      CopyOutcome::Copied | CopyOutcome::CopiedWithFallback => {
        let fallback = outcome == CopyOutcome::CopiedWithFallback;
        self.emit(surface, "copy", json::json!({ "fallback": fallback }));
      }
    }
    self.code().ok_or_else(|| ValidationError::Empty.into())
  }

  fn expire_countdown(&mut self, now: DateTime) {
    let surface = self.surface_at(now);
    let code = self.scope();
    self.drop_terms();
    if self.phase == Phase::Success {
      self.phase = Phase::Hidden;
    }
    info!("terms for `{code}` expired");
    if surface != Surface::None {
      self.emit(surface, "expire", json::json!({ "reason": "countdown" }));
    }
  }

  /// Fires due timers. Driven once per second by the ticker.
  pub fn tick(&mut self, now: DateTime) {
    for kind in self.scheduler.due(now) {
      match kind {
        TimerKind::AutoHide if self.phase == Phase::Success => {
          self.phase = Phase::Hidden;
          self.emit(
            Surface::SuccessMessage,
            "expire",
            json::json!({ "reason": "timeout" }),
          );
        }
        TimerKind::AutoHide => {}
        TimerKind::Countdown => self.expire_countdown(now),
      }
    }

    // a missed tick must not leave expired terms on screen
    if self.terms.as_ref().is_some_and(|t| t.is_expired(now)) {
      self.expire_countdown(now);
    }

    self.settle(now);
  }

  pub fn view(&mut self, now: DateTime) -> View {
    self.tick(now);
    let surface = self.surface_at(now);
    let symbol = &self.engine.currency;

    let discount = self.terms.as_ref().map(|terms| DiscountView {
      label: terms.label(symbol),
      description: terms.description.clone(),
      min_order: terms.min_order.map(|min| format_money(min, symbol)),
      amount_off: self
        .cart_total
        .map(|total| format_money(terms.discount_for(total), symbol)),
    });

    let countdown = self
      .terms
      .as_ref()
      .and_then(|terms| terms.time_left(now))
      .map(|left| Countdown {
        seconds: left.num_seconds(),
        display: format_duration(left),
      });

    View {
      surface,
      phase: self.phase,
      code: self.code().map(str::to_string),
      error: self.failure,
      message: self.failure.map(Category::user_message),
      warning: self.warning.map(Category::user_message),
      discount,
      qualification: self.tracker.last().filter(|_| self.terms.is_some()),
      countdown,
      hides_in_ms: self
        .scheduler
        .deadline(TimerKind::AutoHide)
        .map(|at| (at - now).num_milliseconds().max(0)),
      visible_since: self.visible_since,
    }
  }
}

pub type SharedController = Arc<Mutex<Controller>>;

/// Runs `open` and, when needed, the banner restore without holding the
/// lock across the authority call.
pub async fn open(ctrl: &Mutex<Controller>, referral: Option<Referral>) {
  let (ticket, engine) = {
    let mut c = ctrl.lock().await;
    (c.open(referral, now()).await, c.engine().clone())
  };

  if let Some(ticket) = ticket {
    let outcome = engine.resolver.lookup(ticket.code()).await;
    ctrl.lock().await.complete(ticket, outcome, now()).await;
  }
}

/// Runs a code submission end to end; the newest submission wins.
pub async fn submit(
  ctrl: &Mutex<Controller>,
  code: &str,
  source_url: Option<String>,
) {
  let (ticket, engine) = {
    let mut c = ctrl.lock().await;
    (c.begin_submit(code, source_url, now()), c.engine().clone())
  };

  if let Some(ticket) = ticket {
    let outcome = engine.resolver.lookup(ticket.code()).await;
    ctrl.lock().await.complete(ticket, outcome, now()).await;
  }
}
