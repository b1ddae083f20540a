//! Structural validation of untrusted reference state.
//!
//! A [`Schema`] describes the expected shape of a JSON value. Reference state
//! is checked against a schema before any test is compiled from it, so a
//! malformed document is rejected instead of producing a lax policy.

use std::fmt;

use serde_json::Value;

use crate::digest::HashAlg;
use crate::engine::error::render_value;
use crate::engine::PathSegment;

/// Primitive JSON shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// `null`
    Null,
    /// `true` / `false`
    Bool,
    /// Integral number.
    Integer,
    /// Any number.
    Number,
    /// String.
    String,
    /// Array.
    Sequence,
    /// Object.
    Mapping,
}

impl ValueType {
    /// Whether `value` has this shape.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Null => value.is_null(),
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Sequence => value.is_array(),
            Self::Mapping => value.is_object(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "null",
            Self::Bool => "a boolean",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::String => "a string",
            Self::Sequence => "a list",
            Self::Mapping => "a mapping",
        })
    }
}

/// Why a value does not fit its schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaErrorKind {
    /// Value has the wrong primitive shape.
    #[error("{found} is not {expected}")]
    WrongType {
        /// Required shape.
        expected: ValueType,
        /// Rendering of the value.
        found: String,
    },
    /// A required field is absent.
    #[error("missing field {field:?}")]
    MissingField {
        /// The absent field.
        field: String,
    },
    /// String is not `0x` followed by lowercase hex digits.
    #[error("{value} is not 0x followed by some lowercase hex digits")]
    BadHex {
        /// Rendering of the value.
        value: String,
    },
    /// Hex digest does not have the full width of its algorithm.
    #[error("{alg} digest must have {expected} hex digits, found {actual}")]
    BadWidth {
        /// Algorithm named by the digest key.
        alg: HashAlg,
        /// Digits required by the algorithm.
        expected: usize,
        /// Digits present.
        actual: usize,
    },
    /// String is not a UUID.
    #[error("{value} is not a UUID")]
    BadUuid {
        /// Rendering of the value.
        value: String,
    },
    /// String is not a known hash algorithm name.
    #[error("{value} is not a known hash algorithm")]
    UnknownAlg {
        /// Rendering of the value.
        value: String,
    },
    /// The document is well-shaped but unusable.
    #[error("{reason}")]
    Invalid {
        /// Explanation.
        reason: String,
    },
}

/// A schema violation and where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// Innermost segment first.
    path: Vec<PathSegment>,
    kind: SchemaErrorKind,
}

impl SchemaError {
    /// Violation at the current position.
    pub fn new(kind: SchemaErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
        }
    }

    /// Violation with a free-form reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::new(SchemaErrorKind::Invalid {
            reason: reason.into(),
        })
    }

    /// Reason for the violation.
    pub fn kind(&self) -> &SchemaErrorKind {
        &self.kind
    }

    /// Whether this is a hex-format violation rather than a shape violation.
    pub fn is_format(&self) -> bool {
        matches!(
            self.kind,
            SchemaErrorKind::BadHex { .. } | SchemaErrorKind::BadWidth { .. }
        )
    }

    /// Path rendered outermost first, e.g. `.kernels[0].initrd_plain_sha256`.
    pub fn path_string(&self) -> String {
        self.path.iter().rev().map(ToString::to_string).collect()
    }

    /// Prefix the path with an enclosing segment.
    pub fn within(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }

    /// Prefix the path with an enclosing field.
    pub fn within_field(self, name: &str) -> Self {
        self.within(PathSegment::Field(name.to_owned()))
    }
}

impl From<SchemaErrorKind> for SchemaError {
    fn from(kind: SchemaErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path_string();
        if path.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "at {path}: {}", self.kind)
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// One field of an object schema.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Field name.
    pub name: String,
    /// Shape of the value.
    pub schema: Schema,
    /// Whether absence is a violation.
    pub required: bool,
}

/// Expected shape of a JSON value.
#[derive(Debug, Clone)]
pub enum Schema {
    /// Any value.
    Any,
    /// Value of a primitive shape.
    Type(ValueType),
    /// `0x` followed by one or more lowercase hex digits.
    Hex,
    /// UUID string.
    Uuid,
    /// Hash algorithm name.
    HashAlg,
    /// Mapping from hash algorithm name to full-width `0x` hex.
    Digest,
    /// Mapping whose keys and values each fit a schema.
    Dict {
        /// Schema applied to each key (as a string value).
        key: Box<Schema>,
        /// Schema applied to each value.
        value: Box<Schema>,
    },
    /// Sequence whose elements each fit a schema.
    List(Box<Schema>),
    /// Mapping with named fields. Unlisted fields are allowed.
    Object(Vec<FieldSchema>),
}

/// Value has primitive shape `ty`.
pub fn type_test(ty: ValueType) -> Schema {
    Schema::Type(ty)
}

/// Value is `0x` + lowercase hex.
pub fn hex_test() -> Schema {
    Schema::Hex
}

/// Value is a digest: algorithm name to `0x` hex of exactly the algorithm's
/// output width, leading zeros included.
pub fn digest_test() -> Schema {
    Schema::Digest
}

/// Value is a mapping; keys fit `key`, values fit `value`.
pub fn dict_test(key: Schema, value: Schema) -> Schema {
    Schema::Dict {
        key: Box::new(key),
        value: Box::new(value),
    }
}

/// Value is a sequence of `elem`.
pub fn list_test(elem: Schema) -> Schema {
    Schema::List(Box::new(elem))
}

/// Value is a mapping carrying every named field.
pub fn obj_test<I, S>(fields: I) -> Schema
where
    I: IntoIterator<Item = (S, Schema)>,
    S: Into<String>,
{
    Schema::Object(
        fields
            .into_iter()
            .map(|(name, schema)| FieldSchema {
                name: name.into(),
                schema,
                required: true,
            })
            .collect(),
    )
}

/// Whether `text` is `0x` followed by one or more lowercase hex digits.
pub fn is_hex(text: &str) -> bool {
    match text.strip_prefix("0x") {
        Some(digits) => {
            !digits.is_empty()
                && digits
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        }
        None => false,
    }
}

impl Schema {
    /// Add an optional field to an object schema. Other schemas are returned
    /// unchanged.
    pub fn optional(mut self, name: impl Into<String>, schema: Schema) -> Self {
        if let Self::Object(fields) = &mut self {
            fields.push(FieldSchema {
                name: name.into(),
                schema,
                required: false,
            });
        }
        self
    }

    /// Check `value` against this schema.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, located within `value`.
    pub fn check(&self, value: &Value) -> Result<(), SchemaError> {
        match self {
            Self::Any => Ok(()),
            Self::Type(ty) => {
                if ty.matches(value) {
                    Ok(())
                } else {
                    Err(wrong_type(*ty, value))
                }
            }
            Self::Hex => match value.as_str() {
                Some(text) if is_hex(text) => Ok(()),
                _ => Err(SchemaErrorKind::BadHex {
                    value: render_value(value),
                }
                .into()),
            },
            Self::Uuid => match value.as_str().map(uuid::Uuid::parse_str) {
                Some(Ok(_)) => Ok(()),
                _ => Err(SchemaErrorKind::BadUuid {
                    value: render_value(value),
                }
                .into()),
            },
            Self::HashAlg => match value.as_str().map(|s| s.parse::<HashAlg>()) {
                Some(Ok(_)) => Ok(()),
                _ => Err(SchemaErrorKind::UnknownAlg {
                    value: render_value(value),
                }
                .into()),
            },
            Self::Digest => {
                let map = value
                    .as_object()
                    .ok_or_else(|| wrong_type(ValueType::Mapping, value))?;
                for (alg, text) in map {
                    check_digest_entry(alg, text).map_err(|e| e.within_field(alg))?;
                }
                Ok(())
            }
            Self::Dict { key, value: val } => {
                let map = value
                    .as_object()
                    .ok_or_else(|| wrong_type(ValueType::Mapping, value))?;
                for (k, v) in map {
                    key.check(&Value::String(k.clone()))
                        .and_then(|()| val.check(v))
                        .map_err(|e| e.within_field(k))?;
                }
                Ok(())
            }
            Self::List(elem) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| wrong_type(ValueType::Sequence, value))?;
                for (i, item) in items.iter().enumerate() {
                    elem.check(item).map_err(|e| e.within(PathSegment::Index(i)))?;
                }
                Ok(())
            }
            Self::Object(fields) => {
                let map = value
                    .as_object()
                    .ok_or_else(|| wrong_type(ValueType::Mapping, value))?;
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field
                            .schema
                            .check(v)
                            .map_err(|e| e.within_field(&field.name))?,
                        None if field.required => {
                            return Err(SchemaErrorKind::MissingField {
                                field: field.name.clone(),
                            }
                            .into())
                        }
                        None => {}
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_digest_entry(alg: &str, text: &Value) -> Result<(), SchemaError> {
    let alg_name = Value::String(alg.to_owned());
    let Ok(alg) = alg.parse::<HashAlg>() else {
        return Err(SchemaErrorKind::UnknownAlg {
            value: render_value(&alg_name),
        }
        .into());
    };
    Schema::Hex.check(text)?;
    let actual = text
        .as_str()
        .and_then(|t| t.strip_prefix("0x"))
        .map_or(0, str::len);
    let expected = alg.output_len().saturating_mul(2);
    if actual == expected {
        Ok(())
    } else {
        Err(SchemaErrorKind::BadWidth {
            alg,
            expected,
            actual,
        }
        .into())
    }
}

fn wrong_type(expected: ValueType, value: &Value) -> SchemaError {
    SchemaErrorKind::WrongType {
        expected,
        found: render_value(value),
    }
    .into()
}
