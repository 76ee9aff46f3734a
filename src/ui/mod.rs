pub mod icons;
pub mod progress;
pub mod prompts;

pub use progress::WorkflowUI;
