pub mod authority;
pub mod catalog;
pub mod identity;
pub mod presentation;
pub mod qualification;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod terms;
#[cfg(test)]
pub mod test_utils;

pub use catalog::Catalog;
pub use identity::IdentityStore;
pub use presentation::Controller;
pub use resolver::Resolver;
pub use telemetry::Telemetry;

use crate::prelude::*;

/// Collaborators shared by every visitor's controller.
pub struct Engine {
  pub identity: IdentityStore,
  pub resolver: Resolver,
  pub telemetry: Telemetry,
  pub auto_hide: Duration,
  pub currency: String,
}
