pub mod claude;
pub mod traits;
pub mod util;

pub use claude::ClaudeAgent;
pub use traits::{LlmAgent, TaskType};
pub use util::extract_json;
