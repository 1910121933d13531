//! Diagnostic messages produced by configuration checks.
//!
//! The checks themselves live next to what they inspect (model metadata,
//! admin registrations); this module only defines the message vocabulary.

use std::fmt;

/// Severity of a check message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckLevel {
    /// Informational.
    Info = 1,
    /// A probable mistake that does not stop anything from working.
    Warning = 2,
    /// A definite problem.
    Error = 3,
}

impl fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One finding from a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckMessage {
    /// Severity.
    pub level: CheckLevel,
    /// What is wrong.
    pub msg: String,
    /// How to fix it.
    pub hint: Option<String>,
    /// The object the finding is about (e.g. "labs.member").
    pub obj: Option<String>,
    /// A stable identifier (e.g. "models.E001").
    pub id: &'static str,
}

impl CheckMessage {
    /// Creates a message.
    pub fn new(
        level: CheckLevel,
        id: &'static str,
        msg: impl Into<String>,
        obj: impl Into<String>,
    ) -> Self {
        Self {
            level,
            msg: msg.into(),
            hint: None,
            obj: Some(obj.into()),
            id,
        }
    }

    /// Creates a warning.
    pub fn warning(id: &'static str, msg: impl Into<String>, obj: impl Into<String>) -> Self {
        Self::new(CheckLevel::Warning, id, msg, obj)
    }

    /// Creates an error.
    pub fn error(id: &'static str, msg: impl Into<String>, obj: impl Into<String>) -> Self {
        Self::new(CheckLevel::Error, id, msg, obj)
    }

    /// Attaches a hint.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Returns `true` for warnings and errors.
    pub fn is_serious(&self) -> bool {
        self.level >= CheckLevel::Warning
    }
}

impl fmt::Display for CheckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref obj) = self.obj {
            write!(f, "{obj}: ")?;
        }
        write!(f, "({}) {}: {}", self.id, self.level, self.msg)?;
        if let Some(ref hint) = self.hint {
            write!(f, "\n\tHINT: {hint}")?;
        }
        Ok(())
    }
}

/// Returns `true` if any message is an error.
pub fn has_errors(messages: &[CheckMessage]) -> bool {
    messages.iter().any(|m| m.level == CheckLevel::Error)
}
