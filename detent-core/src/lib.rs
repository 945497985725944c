// Detent Core Library
// Workflow instrumentation, manifest building and the lifecycle marker protocol

pub mod decoder;
pub mod error;
pub mod events;
pub mod graph;
pub mod inject;
pub mod manifest;
pub mod marker;
pub mod prepare;
pub mod runner;
pub mod sensitivity;
pub mod utils;
pub mod workflow;

// Re-export commonly used types
pub use error::{CoreError, CoreResult, PrepareError};

// Re-export document model types
pub use workflow::{Condition, ContinueOnError, Job, JobNeeds, Step, Workflow, WorkflowParser};

// Re-export build-time types
pub use graph::DependencyGraph;
pub use inject::{Injector, JobOverride, JobOverrides, Pass, TimeoutConfig};
pub use manifest::{Manifest, ManifestHost, ManifestJob, MANIFEST_VERSION};
pub use prepare::{PrepareOptions, PreparedWorkflows, WorkflowPreparer};
pub use sensitivity::{Sensitivity, SensitivityRules};

// Re-export runtime types
pub use decoder::MarkerDecoder;
pub use events::{
    progress_channel, DoneEvent, ErrorEvent, EventSender, ExtractedError, JobAction, JobEvent,
    ManifestEvent, ProgressReceiver, ProgressSender, RunEvent, StepEvent,
};
pub use marker::Marker;
pub use runner::{Runner, RunnerConfig, RunnerHandle};
