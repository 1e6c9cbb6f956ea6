#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Concurrent driver running one session per answer.
pub mod grader;
/// Shared grade result types.
pub mod results;
/// The per-question tool-calling state machine.
pub mod session;
/// Parsing and validation of the model's final grade.
pub mod verdict;

pub use grader::Grader;
pub use results::{Grade, GradeResult, GradeStatus};
pub use session::{GradingError, GradingSession, SessionOutcome, SessionState};
pub use verdict::Verdict;
