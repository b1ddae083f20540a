//! Located validation failures.

use std::fmt;

use serde_json::Value;

use crate::error::ErrorKind;
use crate::event::DigestsShapeError;

use super::delay::SlotState;
use super::dispatch::DispatchKey;

/// Longest rendering of a rejected value kept in an error message.
const MAX_RENDERED_CHARS: usize = 240;

/// One step from the root input down to the failing sub-test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Named field of an object.
    Field(String),
    /// Position in a sequence.
    Index(usize),
    /// Dispatch entry chosen for the element.
    Key(DispatchKey),
    /// Delayed-binding slot read by a getter.
    Slot(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(key) => write!(f, "<{key}>"),
            Self::Slot(name) => write!(f, "${name}"),
        }
    }
}

/// Why a test rejected its input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TestErrorKind {
    /// An object lacks a field the test requires.
    #[error("missing field {field:?}")]
    MissingField {
        /// The absent field.
        field: String,
    },
    /// The input is not of the shape the test works on.
    #[error("expected {expected}, found {found}")]
    WrongShape {
        /// Shape description, e.g. "a sequence".
        expected: &'static str,
        /// Rendering of the rejected value.
        found: String,
    },
    /// A sequence has the wrong number of elements for a tuple test.
    #[error("expected a sequence of length {expected}, found length {actual}")]
    LengthMismatch {
        /// Tuple arity.
        expected: usize,
        /// Sequence length.
        actual: usize,
    },
    /// No test is registered for the element's key.
    #[error("no test registered for {key}")]
    Dispatch {
        /// The unmatched key.
        key: DispatchKey,
    },
    /// A value differs from the expected one.
    #[error("{what} mismatch: expected {expected}, found {actual}")]
    FieldMismatch {
        /// What was compared, e.g. "sha256 digest".
        what: String,
        /// Expected value.
        expected: String,
        /// Observed value.
        actual: String,
    },
    /// The input lacks a digest for an algorithm the expected digest names.
    #[error("no {alg} digest present")]
    MissingDigest {
        /// Algorithm name.
        alg: String,
    },
    /// A string does not match a required pattern.
    #[error("{value} does not match /{pattern}/")]
    NoMatch {
        /// The anchored pattern.
        pattern: String,
        /// Rendering of the rejected string.
        value: String,
    },
    /// A delayed-binding slot was used outside its bound window.
    #[error("slot {slot:?} is {state}")]
    UnboundSlot {
        /// Slot name.
        slot: String,
        /// State the slot was found in.
        state: SlotState,
    },
    /// Event digests are unreadable.
    #[error(transparent)]
    Digests(#[from] DigestsShapeError),
    /// A reject-all test was reached.
    #[error("rejected: {reason}")]
    Rejected {
        /// Configured reason.
        reason: String,
    },
    /// Every alternative of an `Or` failed.
    #[error("no alternative passed: [{}]", .reasons.join("; "))]
    NoAlternative {
        /// Failure of each alternative, in order.
        reasons: Vec<String>,
    },
}

impl TestErrorKind {
    /// Crate-wide classification of this failure.
    pub fn class(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. }
            | Self::WrongShape { .. }
            | Self::LengthMismatch { .. }
            | Self::Digests(_) => ErrorKind::Shape,
            Self::Dispatch { .. } => ErrorKind::Dispatch,
            Self::FieldMismatch { .. }
            | Self::MissingDigest { .. }
            | Self::NoMatch { .. }
            | Self::Rejected { .. }
            | Self::NoAlternative { .. } => ErrorKind::FieldMismatch,
            Self::UnboundSlot { .. } => ErrorKind::UnboundSlot,
        }
    }
}

/// A failed validation: the reason plus where in the input it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct TestError {
    /// Innermost segment first; reversed for display.
    path: Vec<PathSegment>,
    kind: TestErrorKind,
    element: Option<String>,
}

impl TestError {
    /// Failure at the current position.
    pub fn new(kind: TestErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
            element: None,
        }
    }

    /// Reason for the failure.
    pub fn kind(&self) -> &TestErrorKind {
        &self.kind
    }

    /// Path from the root input to the failure, outermost first.
    pub fn path(&self) -> impl Iterator<Item = &PathSegment> {
        self.path.iter().rev()
    }

    /// Path rendered as `.events[3]<4, "EV_SEPARATOR">`.
    pub fn path_string(&self) -> String {
        self.path().map(ToString::to_string).collect()
    }

    /// The offending sequence element, when the iterating test echoes elements.
    pub fn element(&self) -> Option<&str> {
        self.element.as_deref()
    }

    /// Prefix the path with an enclosing segment.
    pub(crate) fn within(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }

    /// Record the element being validated unless an inner iteration already did.
    pub(crate) fn with_element(mut self, element: &Value) -> Self {
        if self.element.is_none() {
            self.element = Some(render_value(element));
        }
        self
    }
}

impl From<TestErrorKind> for TestError {
    fn from(kind: TestErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path_string();
        if path.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "at {path}: {}", self.kind)?;
        }
        if let Some(element) = &self.element {
            write!(f, " (element: {element})")?;
        }
        Ok(())
    }
}

impl std::error::Error for TestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Compact JSON rendering of a value for error messages.
pub(crate) fn render_value(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_RENDERED_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_RENDERED_CHARS).collect();
    cut.push('…');
    cut
}
