use anyhow::Result;
use async_trait::async_trait;

/// What an LLM call is for. Carried into logs and provider-side metadata so
/// spend can be attributed per concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    SourceAnalysis,
    CompanyExtraction,
    JobExtraction,
    FailureReview,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::SourceAnalysis => write!(f, "source_analysis"),
            TaskType::CompanyExtraction => write!(f, "company_extraction"),
            TaskType::JobExtraction => write!(f, "job_extraction"),
            TaskType::FailureReview => write!(f, "failure_review"),
        }
    }
}

/// The single seam between the pipeline and any LLM provider.
///
/// The core treats LLM failures as optional failures: every call site has a
/// deterministic fallback, so implementations should surface errors rather
/// than retry forever.
#[async_trait]
pub trait LlmAgent: Send + Sync {
    async fn execute(
        &self,
        task_type: TaskType,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}
