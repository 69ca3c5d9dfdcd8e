use serde::{Deserialize, Serialize};

/// Request body for the Inference API.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub inputs: String,
}

impl InferenceRequest {
    pub fn new(inputs: impl Into<String>) -> Self {
        Self {
            inputs: inputs.into(),
        }
    }
}

/// One element of the Inference API response array.
///
/// Summarization models answer with `summary_text`, text-generation models
/// with `generated_text`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferenceOutput {
    pub summary_text: Option<String>,
    pub generated_text: Option<String>,
}

impl InferenceOutput {
    /// The produced text, whichever field the model filled in.
    pub fn text(&self) -> Option<&str> {
        self.summary_text
            .as_deref()
            .or(self.generated_text.as_deref())
    }
}
