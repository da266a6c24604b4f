pub mod filter;
pub mod pending;

pub use filter::{BlockReason, CandidateInfo, CandidateType, FilterResult, admit};
pub use pending::{DEFAULT_PENDING_CAPACITY, DrainedCandidates, PendingCandidates};
