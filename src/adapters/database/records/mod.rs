pub mod message;
pub mod profile;

pub use message::MessageRecord;
pub use profile::ProfileRecord;
