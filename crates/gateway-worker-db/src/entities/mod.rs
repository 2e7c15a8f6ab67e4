//! Database entities

pub mod certificate;
pub mod job_history;

pub use certificate::Entity as Certificate;
pub use job_history::Entity as JobHistory;
