//! The Error crate contains helpful wrappers around the possible failures of a
//! signature resolution run. A run either yields a resolved signature or exactly one
//! [`Error`]; the engine never recovers locally. Errors do not carry source locations:
//! the caller owns the mapping from offending requirements back to source text, so an
//! [`Error`] only carries the requirement and type expressions it is about, rendered
//! into its message and hints.

use std::fmt::{Display, Formatter};

use colored::Colorize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrKind {
    Hint,
    DuplicateProtocol,
    UnknownProtocol,
    DuplicateType,
    UnknownType,
    MalformedRequirement,
    ConflictingConcreteTypes,
    DidNotConverge,
}

impl ErrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrKind::Hint => "hint",
            ErrKind::DuplicateProtocol => "duplicate protocol",
            ErrKind::UnknownProtocol => "unknown protocol",
            ErrKind::DuplicateType => "duplicate type",
            ErrKind::UnknownType => "unknown type",
            ErrKind::MalformedRequirement => "malformed requirement",
            ErrKind::ConflictingConcreteTypes => "conflicting concrete types",
            ErrKind::DidNotConverge => "resolution did not converge",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Error {
    kind: ErrKind,
    msg: Option<String>,
    hints: Vec<Error>,
}

impl Error {
    pub fn new(kind: ErrKind) -> Error {
        Error {
            kind,
            msg: None,
            hints: vec![],
        }
    }

    pub fn hint() -> Error {
        Error::new(ErrKind::Hint)
    }

    pub fn with_msg(self, msg: String) -> Error {
        Error {
            msg: Some(msg),
            ..self
        }
    }

    // Add a hint to emit alongside the error
    pub fn with_hint(self, hint: Error) -> Error {
        let mut new_hints = self.hints;
        new_hints.push(hint);

        Error {
            hints: new_hints,
            ..self
        }
    }

    pub fn kind(&self) -> &ErrKind {
        &self.kind
    }

    fn emit_hint(&self) {
        eprint!("{}: ", "hint".black().on_green());
        if let Some(msg) = &self.msg {
            eprintln!("{msg}");
        }
    }

    pub fn emit(&self) {
        eprint!("{}: {}", "error".black().on_yellow(), self.kind.as_str());
        match &self.msg {
            Some(msg) => eprintln!(": {msg}"),
            None => eprintln!(),
        }

        self.hints.iter().for_each(|hint| hint.emit_hint());
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(msg) = &self.msg {
            write!(f, ": {msg}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
