pub mod openai;
pub mod types;

pub use openai::OpenAiProvider;
pub use types::{ChatRequest, ChatResponse, LlmError, LlmProvider};

pub(crate) fn build_llm_http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .map_err(|e| LlmError::Http(e.to_string()))
}
