use crate::errors::SubmissionError;
use crate::languages::{LanguageDescriptor, LanguageRegistry};
use std::sync::Arc;

/// Validated source code and the descriptor of its language.
///
/// Construction is the only place a request is checked, so holding a
/// `Submission` means no sandbox work can fail on user input.
#[derive(Debug, Clone)]
pub struct Submission {
    code: String,
    language: Arc<LanguageDescriptor>,
}

impl Submission {
    /// Checks code, then language presence, then registration.
    pub fn new(
        code: Option<String>,
        language: Option<String>,
        registry: &LanguageRegistry,
    ) -> Result<Self, SubmissionError> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(SubmissionError::MissingCode)?;
        let language = language
            .filter(|l| !l.is_empty())
            .ok_or(SubmissionError::MissingLanguage)?;
        let language = registry
            .get(&language)
            .ok_or(SubmissionError::InvalidLanguage)?;

        Ok(Self { code, language })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn language(&self) -> &LanguageDescriptor {
        &self.language
    }
}
