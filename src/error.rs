use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Local input problems. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
  #[error("affiliate code is empty")]
  Empty,
  #[error("affiliate code is longer than {0} characters")]
  TooLong(usize),
  #[error("affiliate code `{0}` contains invalid characters")]
  InvalidFormat(String),
  #[error("unknown surface `{0}`")]
  UnknownSurface(String),
  #[error("invalid amount: {0}")]
  InvalidAmount(String),
}

/// The authority answered, but refused the code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
  #[error("code not found")]
  NotFound,
  #[error("code expired")]
  Expired,
  #[error("malformed terms: {0}")]
  Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(#[from] ValidationError),
  #[error("authority unreachable: {0}")]
  Network(String),
  #[error("authority rejected code: {0}")]
  Rejected(#[from] Rejection),
  #[error("session store failure: {0}")]
  Persistence(String),
  #[error("database error: {0}")]
  Db(#[from] sea_orm::DbErr),
  #[error("unauthorized")]
  Unauthorized,
  #[error("internal error: {0}")]
  Internal(String),
}

/// User-facing error bucket. Raw error text never leaves the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  Validation,
  Network,
  Rejected,
  Persistence,
  Internal,
}

impl Category {
  pub fn as_str(self) -> &'static str {
    match self {
      Category::Validation => "validation",
      Category::Network => "network",
      Category::Rejected => "rejected",
      Category::Persistence => "persistence",
      Category::Internal => "internal",
    }
  }

  pub fn user_message(self) -> &'static str {
    match self {
      Category::Validation => {
        "Please enter a valid affiliate code (letters, numbers, dashes and \
         underscores only)."
      }
      Category::Network => {
        "We couldn't verify your code right now. Please try again."
      }
      Category::Rejected => "This affiliate code is invalid or has expired.",
      Category::Persistence => "Your code was applied for this visit only.",
      Category::Internal => "Something went wrong. Please try again later.",
    }
  }
}

impl Error {
  pub fn category(&self) -> Category {
    match self {
      Error::Validation(_) => Category::Validation,
      Error::Network(_) => Category::Network,
      Error::Rejected(_) => Category::Rejected,
      Error::Persistence(_) => Category::Persistence,
      Error::Db(_) | Error::Unauthorized | Error::Internal(_) => {
        Category::Internal
      }
    }
  }
}
