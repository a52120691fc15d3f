pub use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::{Duration, Instant},
};

pub use chrono::{NaiveDateTime as DateTime, TimeDelta, TimeZone, Utc};
pub use dashmap::DashMap;
pub use migration::MigratorTrait;
pub use sea_orm::{
  ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait,
  QueryFilter, Set,
};
pub use tracing::{debug, error, info, trace, warn};

pub use crate::error::{Category, Error, Rejection, Result, ValidationError};

pub fn now() -> DateTime {
  Utc::now().naive_utc()
}
