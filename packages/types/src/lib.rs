pub mod account;
pub mod audit;
pub mod descriptor;
pub mod event;
pub mod id;
pub mod metadata;
pub mod pagination;
pub mod resource;
pub mod submission;

pub use account::Account;
pub use audit::AuditEntry;
pub use descriptor::Descriptor;
pub use event::{Event, ProcessedEvent, Progress};
pub use id::{AccountId, ResourceId};
pub use metadata::Metadata;
pub use pagination::{Page, Pagination};
pub use resource::{ResourceRecord, ResourceStatus, StatusTransitionError};
pub use submission::{SubmissionEnvelope, SubmissionPriority, SubmissionRequest, SubmissionStatus};
