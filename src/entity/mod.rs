pub mod discount_terms;
pub mod interaction_event;
pub mod session_entry;

pub use discount_terms::DiscountType;
