pub mod models;
pub mod parser;

pub use models::{Condition, ContinueOnError, Job, JobNeeds, Step, Workflow};
pub use parser::WorkflowParser;
