//! Field-scoped validation errors.
//!
//! Mirrors the shape of the API server's own field errors so that admission
//! denials render the same way `kubectl` users already know.

use std::fmt;

/// Dotted path to a field, e.g. `spec.nodes[1].resources.cpuLimit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    /// Root path.
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    /// Path to a named child field.
    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    /// Path to a list element.
    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{}]", self.0, i))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorType {
    /// The value is not acceptable.
    Invalid,
    /// A required value is missing.
    Required,
    /// The value must not be set.
    Forbidden,
    /// The value repeats one seen earlier in a list.
    Duplicate,
}

impl FieldErrorType {
    /// Cause type reported in admission status details.
    pub fn cause_type(&self) -> &'static str {
        match self {
            FieldErrorType::Invalid => "FieldValueInvalid",
            FieldErrorType::Required => "FieldValueRequired",
            FieldErrorType::Forbidden => "FieldValueForbidden",
            FieldErrorType::Duplicate => "FieldValueDuplicate",
        }
    }
}

/// A single validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Error kind.
    pub error_type: FieldErrorType,
    /// Path of the offending field.
    pub field: String,
    /// The offending value, rendered as text.
    pub bad_value: String,
    /// Human-readable detail.
    pub detail: String,
}

impl FieldError {
    /// The value is not acceptable.
    pub fn invalid(path: &FieldPath, bad_value: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Invalid,
            field: path.to_string(),
            bad_value: bad_value.into(),
            detail: detail.into(),
        }
    }

    /// A required value is missing.
    pub fn required(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Required,
            field: path.to_string(),
            bad_value: String::new(),
            detail: detail.into(),
        }
    }

    /// The value must not be set.
    pub fn forbidden(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Forbidden,
            field: path.to_string(),
            bad_value: String::new(),
            detail: detail.into(),
        }
    }

    /// The value duplicates an earlier list entry.
    pub fn duplicate(path: &FieldPath, bad_value: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Duplicate,
            field: path.to_string(),
            bad_value: bad_value.into(),
            detail: String::new(),
        }
    }

    /// Error text without the field path.
    pub fn body(&self) -> String {
        let mut body = match self.error_type {
            FieldErrorType::Invalid => format!("Invalid value: {:?}", self.bad_value),
            FieldErrorType::Duplicate => format!("Duplicate value: {:?}", self.bad_value),
            FieldErrorType::Required => "Required value".to_string(),
            FieldErrorType::Forbidden => "Forbidden".to_string(),
        };
        if !self.detail.is_empty() {
            body.push_str(": ");
            body.push_str(&self.detail);
        }
        body
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.body())
    }
}

/// Accumulated validation failures for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrorList(Vec<FieldError>);

impl FieldErrorList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one error.
    pub fn push(&mut self, err: FieldError) {
        self.0.push(err);
    }

    /// Whether no error was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over errors.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// `Ok(())` when empty, the list itself otherwise.
    pub fn into_result(self) -> Result<(), FieldErrorList> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Extend<FieldError> for FieldErrorList {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<FieldError> for FieldErrorList {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FieldErrorList {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for FieldErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [only] => write!(f, "{}", only),
            many => {
                f.write_str("[")?;
                for (i, err) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                f.write_str("]")
            }
        }
    }
}
