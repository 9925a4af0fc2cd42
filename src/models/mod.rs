pub mod alert;
pub mod edit;

pub use alert::{AlertKind, AlertPayload, AlertRecord, Severity};
pub use edit::{derive_language, Edit, RawEdit, ValidationError};
