//! Semantic color palette for terminal output.

use echo_abac::resolver::Outcome;
use owo_colors::{OwoColorize, Style};

#[derive(Clone, Copy)]
enum Tone {
    Success,
    Error,
    Warning,
    Muted,
    Header,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Success => Style::new().green().bold(),
            Self::Error => Style::new().red().bold(),
            Self::Warning => Style::new().yellow(),
            Self::Muted => Style::new().dimmed(),
            Self::Header => Style::new().bold(),
        }
    }

    fn paint<T: std::fmt::Display>(self, value: &T) -> String {
        if super::no_color() {
            value.to_string()
        } else {
            value.style(self.style()).to_string()
        }
    }
}

/// Semantic styling for anything displayable; plain text when colors are off.
pub trait SemanticStyle: Sized {
    fn success(&self) -> String;
    fn error(&self) -> String;
    fn warning(&self) -> String;
    fn muted(&self) -> String;
    fn header(&self) -> String;
}

impl<T: std::fmt::Display> SemanticStyle for T {
    fn success(&self) -> String {
        Tone::Success.paint(self)
    }

    fn error(&self) -> String {
        Tone::Error.paint(self)
    }

    fn warning(&self) -> String {
        Tone::Warning.paint(self)
    }

    fn muted(&self) -> String {
        Tone::Muted.paint(self)
    }

    fn header(&self) -> String {
        Tone::Header.paint(self)
    }
}

/// Decision outcome in its conventional color.
pub fn outcome_label(outcome: Outcome) -> String {
    match outcome {
        Outcome::Permit => "PERMIT".success(),
        Outcome::Deny => "DENY".error(),
        Outcome::NotApplicable => "NOT APPLICABLE".warning(),
    }
}
