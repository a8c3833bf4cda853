//! Data models for tablescout.

mod audit;
mod detection;
mod rating;
mod venue;

pub use audit::{AuditProvider, AuditRecord, AuditStatus};
pub use detection::{
    DetectionSource, EditorialHint, OpeningPattern, Provider, ReservationDetectionResult,
};
pub use rating::{RatingRecord, RatingSource};
pub use venue::{ReservationFields, Venue};
