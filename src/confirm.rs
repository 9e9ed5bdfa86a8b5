//! Operator confirmation for risky and destructive steps.

use std::io::{self, BufRead, Write};

/// Decides whether to proceed past a warning prompt.
pub trait ConfirmationPolicy: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on stderr and reads one line from stdin.
///
/// Only `y` or `yes` (any case) count as consent; EOF or a read error is a
/// refusal, so a non-interactive caller without input never proceeds.
#[derive(Debug, Default)]
pub struct TerminalConfirm;

impl ConfirmationPolicy for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        {
            let mut err = io::stderr().lock();
            let _ = write!(err, "{} [y/N]: ", prompt);
            let _ = err.flush();
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_affirmative(&line),
        }
    }
}

/// Pre-confirmed, for `--yes` and tests.
#[derive(Debug, Default)]
pub struct AlwaysConfirm;

impl ConfirmationPolicy for AlwaysConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(prompt, "auto-confirmed");
        true
    }
}

/// Refuses every prompt.
#[derive(Debug, Default)]
pub struct NeverConfirm;

impl ConfirmationPolicy for NeverConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(prompt, "auto-declined");
        false
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative("YES\n"));
        assert!(is_affirmative("  yes  "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yess"));
    }

    #[test]
    fn test_fixed_policies() {
        assert!(AlwaysConfirm.confirm("go?"));
        assert!(!NeverConfirm.confirm("go?"));
    }
}
