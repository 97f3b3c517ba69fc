// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator interaction.
//!
//! Every suspension point of a release is a question to the __operator__:
//! which version to release, what note to attach, and whether to go ahead.
//! The [`Operator`] trait is the seam between the release flow and whoever
//! answers those questions. [`InquireOperator`] asks a human on the terminal.
//! [`ScriptedOperator`] answers from a fixed script, which serves batch
//! invocation and tests alike.

use crate::version::{Tier, ValidationError, VersionNumber};

use inquire::{Confirm, InquireError, Text};
use std::collections::VecDeque;
use tracing::warn;

/// Answers questions asked during a release.
pub trait Operator {
    /// Ask for version to release, suggesting a default.
    fn version(
        &mut self,
        suggested: &VersionNumber,
        previous: Option<&VersionNumber>,
        tier: &Tier,
    ) -> Result<String>;

    /// Tell operator why their version was rejected.
    fn reject(&mut self, error: &ValidationError);

    /// Ask for release note, showing a hint.
    fn note(&mut self, hint: &str) -> Result<String>;

    /// Ask operator to confirm before anything is written.
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Operator prompted on the terminal.
#[derive(Debug, Default)]
pub struct InquireOperator;

impl InquireOperator {
    /// Construct new terminal operator.
    pub fn new() -> Self {
        Self
    }
}

impl Operator for InquireOperator {
    fn version(
        &mut self,
        suggested: &VersionNumber,
        previous: Option<&VersionNumber>,
        tier: &Tier,
    ) -> Result<String> {
        let message = match previous {
            Some(previous) => format!("{tier} version [previous: {previous}]:"),
            None => format!("{tier} version:"),
        };
        let default = suggested.to_string();

        Ok(Text::new(&message)
            .with_default(&default)
            .with_help_message("X.Y.Z, press enter to accept suggestion")
            .prompt()?)
    }

    fn reject(&mut self, error: &ValidationError) {
        warn!("{error}");
    }

    fn note(&mut self, hint: &str) -> Result<String> {
        let placeholder = format!("e.g., {hint}");

        Ok(Text::new("Release note:")
            .with_placeholder(&placeholder)
            .prompt()?)
    }

    fn confirm(&mut self, message: &str) -> Result<bool> {
        Ok(Confirm::new(message).with_default(true).prompt()?)
    }
}

/// Operator answering from a fixed script.
///
/// Version answers of `None` accept the suggested version. Running out of
/// answers counts as cancellation, so a rejected scripted version aborts the
/// release instead of asking forever.
#[derive(Debug, Default, Clone)]
pub struct ScriptedOperator {
    versions: VecDeque<Option<String>>,
    notes: VecDeque<String>,
    confirmations: VecDeque<bool>,
    rejections: Vec<ValidationError>,
}

impl ScriptedOperator {
    /// Construct new operator with empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer next version question with given version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.versions.push_back(Some(version.into()));
        self
    }

    /// Answer next version question by accepting the suggestion.
    pub fn with_suggested_version(mut self) -> Self {
        self.versions.push_back(None);
        self
    }

    /// Answer next note question.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push_back(note.into());
        self
    }

    /// Answer next confirmation question.
    pub fn with_confirmation(mut self, confirm: bool) -> Self {
        self.confirmations.push_back(confirm);
        self
    }

    /// Versions rejected so far.
    pub fn rejections(&self) -> &[ValidationError] {
        &self.rejections
    }
}

impl Operator for ScriptedOperator {
    fn version(
        &mut self,
        suggested: &VersionNumber,
        _previous: Option<&VersionNumber>,
        _tier: &Tier,
    ) -> Result<String> {
        match self.versions.pop_front() {
            Some(Some(version)) => Ok(version),
            Some(None) => Ok(suggested.to_string()),
            None => Err(PromptError::Cancelled),
        }
    }

    fn reject(&mut self, error: &ValidationError) {
        warn!("{error}");
        self.rejections.push(error.clone());
    }

    fn note(&mut self, _hint: &str) -> Result<String> {
        self.notes.pop_front().ok_or(PromptError::Cancelled)
    }

    fn confirm(&mut self, _message: &str) -> Result<bool> {
        self.confirmations.pop_front().ok_or(PromptError::Cancelled)
    }
}

/// Operator interaction error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Operator cancelled or interrupted the prompt.
    #[error("operation cancelled by operator")]
    Cancelled,

    /// Prompt could not be shown or answered.
    #[error(transparent)]
    Inquire(InquireError),
}

impl From<InquireError> for PromptError {
    fn from(error: InquireError) -> Self {
        match error {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => {
                Self::Cancelled
            }
            error => Self::Inquire(error),
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = PromptError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scripted_answers_in_order() -> anyhow::Result<()> {
        let mut operator = ScriptedOperator::new()
            .with_version("1.0.0")
            .with_suggested_version()
            .with_note("First")
            .with_confirmation(false);
        let dev = Tier::new("Dev");
        let suggested = VersionNumber::new(0, 0, 3);

        assert_eq!(operator.version(&suggested, None, &dev)?, "1.0.0");
        assert_eq!(operator.version(&suggested, None, &dev)?, "0.0.3");
        assert!(matches!(
            operator.version(&suggested, None, &dev),
            Err(PromptError::Cancelled)
        ));
        assert_eq!(operator.note("hint")?, "First");
        assert!(!operator.confirm("go?")?);
        assert!(matches!(operator.confirm("go?"), Err(PromptError::Cancelled)));

        Ok(())
    }

    #[test]
    fn inquire_interrupts_become_cancellation() {
        assert!(matches!(
            PromptError::from(InquireError::OperationInterrupted),
            PromptError::Cancelled
        ));
        assert!(matches!(
            PromptError::from(InquireError::NotTTY),
            PromptError::Inquire(InquireError::NotTTY)
        ));
    }
}
