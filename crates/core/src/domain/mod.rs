pub mod context;
pub mod policy;

pub use context::{EmployeeProfile, FieldValue, TripContext, TripSegment};
pub use policy::{OrgId, Policy, PolicyId, PolicyKind, PolicyScope};
