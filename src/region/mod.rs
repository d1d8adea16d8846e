//! Province validation and administrative correction.

mod corrector;
mod index;
mod validator;

pub use corrector::{Change, CorrectionOutcome, RegionCorrector, ReviewItem, ReviewReason};
pub use index::{IndexedRegion, RegionIndex};
pub use validator::{tier_order, AuditReport, RegionValidator, Violation};
