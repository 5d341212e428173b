//! Destructive action guard.
//!
//! Format and partition phases can only obtain a [`DestructiveToken`] through
//! [`DestructiveGuard::authorize`], which shows the operator the host and its drives and
//! requires an exact typed acknowledgement.

use pantheon_core::hosts::HostProfile;
use pantheon_error::ProvisionError;
use pantheon_hal::{FormatOptions, PartedOptions, WipeFsOptions};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

pub const CONFIRM_WORD: &str = "DESTROY";

/// Where confirmation prompts go and answers come from.
pub trait ConfirmationPort: Send {
    /// Show `message` and return one line of input without its line terminator.
    fn ask(&mut self, message: &str) -> io::Result<String>;
}

/// Reads answers from the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl ConfirmationPort for TerminalPrompt {
    fn ask(&mut self, message: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{message}")?;
        stdout.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Canned answers, for tests and unattended rehearsals. Runs out as an empty answer.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAnswers {
    answers: Arc<Mutex<VecDeque<String>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAnswers {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().map(Into::into).collect())),
            asked: Arc::default(),
        }
    }

    /// Prompts shown so far.
    pub fn asked(&self) -> Vec<String> {
        match self.asked.lock() {
            Ok(asked) => asked.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ConfirmationPort for ScriptedAnswers {
    fn ask(&mut self, message: &str) -> io::Result<String> {
        let poisoned = || io::Error::new(io::ErrorKind::Other, "scripted answers lock poisoned");
        self.asked
            .lock()
            .map_err(|_| poisoned())?
            .push(message.to_string());
        Ok(self
            .answers
            .lock()
            .map_err(|_| poisoned())?
            .pop_front()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abort,
}

/// Proof that the operator approved a destructive action.
///
/// Only [`DestructiveGuard::authorize`] mints one. The pipeline builds its confirmed HAL
/// options from a token and never calls the option constructors directly; the HAL itself
/// cannot tell where a `confirmed` flag came from.
#[derive(Debug)]
pub struct DestructiveToken {
    action: String,
}

impl DestructiveToken {
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::new(true)
    }

    pub fn wipefs_options(&self) -> WipeFsOptions {
        WipeFsOptions::new(true)
    }

    pub fn parted_options(&self) -> PartedOptions {
        PartedOptions::new(true)
    }
}

pub struct DestructiveGuard {
    port: Box<dyn ConfirmationPort>,
}

impl DestructiveGuard {
    pub fn new(port: impl ConfirmationPort + 'static) -> Self {
        Self {
            port: Box::new(port),
        }
    }

    pub fn expected_answer(profile: &HostProfile) -> String {
        format!("{CONFIRM_WORD} {}", profile.host)
    }

    pub fn render(action: &str, profile: &HostProfile) -> String {
        let mut msg = String::new();
        msg.push_str(&format!("\n*** DESTRUCTIVE ACTION: {action} ***\n"));
        msg.push_str(&format!("Host:   {}\n", profile.host));
        msg.push_str("Drives:\n");
        for drive in &profile.drives {
            msg.push_str(&format!("  - {}\n", drive.display()));
        }
        msg.push_str("Everything on these drives will be lost.\n");
        msg.push_str(&format!(
            "Type '{}' to continue: ",
            Self::expected_answer(profile)
        ));
        msg
    }

    pub fn confirm(&mut self, action: &str, profile: &HostProfile) -> Decision {
        let answer = match self.port.ask(&Self::render(action, profile)) {
            Ok(answer) => answer,
            Err(err) => {
                log::warn!("Failed to read confirmation: {err}");
                return Decision::Abort;
            }
        };
        if answer == Self::expected_answer(profile) {
            log::info!("Operator confirmed {action} on {}", profile.host);
            Decision::Proceed
        } else {
            log::warn!("Operator declined {action} on {}", profile.host);
            Decision::Abort
        }
    }

    pub fn authorize(
        &mut self,
        action: &str,
        profile: &HostProfile,
    ) -> Result<DestructiveToken, ProvisionError> {
        match self.confirm(action, profile) {
            Decision::Proceed => Ok(DestructiveToken {
                action: action.to_string(),
            }),
            Decision::Abort => Err(ProvisionError::UserAborted {
                action: action.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantheon_core::hosts::resolve;

    fn guard_with(answer: &str) -> (DestructiveGuard, ScriptedAnswers) {
        let answers = ScriptedAnswers::new([answer]);
        (DestructiveGuard::new(answers.clone()), answers)
    }

    #[test]
    fn exact_answer_proceeds() {
        let profile = resolve("THEMIS").unwrap();
        let (mut guard, answers) = guard_with("DESTROY THEMIS");
        let token = guard.authorize("repartition", &profile).unwrap();
        assert_eq!(token.action(), "repartition");
        assert!(token.format_options().confirmed);

        let prompt = &answers.asked()[0];
        assert!(prompt.contains("repartition"));
        assert!(prompt.contains("THEMIS"));
        for drive in ["/dev/nvme0n1", "/dev/nvme1n1", "/dev/sda"] {
            assert!(prompt.contains(drive));
        }
    }

    #[test]
    fn anything_else_aborts() {
        let profile = resolve("ASTER").unwrap();
        for answer in [
            "",
            "DESTROY",
            "DESTROY ASTE",
            "destroy aster",
            "Destroy ASTER",
            " DESTROY ASTER",
            "DESTROY ASTER ",
            "y",
        ] {
            let (mut guard, _) = guard_with(answer);
            let err = guard.authorize("low-level format", &profile).unwrap_err();
            assert!(
                matches!(err, ProvisionError::UserAborted { .. }),
                "{answer:?} should abort"
            );
        }
    }

    #[test]
    fn exhausted_script_aborts() {
        let profile = resolve("APOLLO").unwrap();
        let mut guard = DestructiveGuard::new(ScriptedAnswers::default());
        assert_eq!(guard.confirm("repartition", &profile), Decision::Abort);
    }
}
