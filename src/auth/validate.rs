//! Schema-based validation for user-supplied fields.
//!
//! Every value that reaches a store query passes through here first. Raw input
//! keeps the *shape* of what the client sent ([`FieldValue::Structured`] for
//! nested objects, bracket keys such as `user[$ne]`, arrays and repeated keys),
//! so structured payloads are rejected instead of being flattened into
//! something a query layer could read as an operator.
//!
//! Flow Overview:
//! 1) Parse the body or query string into a [`RawInput`].
//! 2) Check it against a [`Schema`] with [`validate`].
//! 3) Hand the resulting [`ValidatedFields`] to the service layer.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use super::password::MAX_PASSWORD_BYTES;

pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MAX_LEN: usize = 20;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PASSWORD_MAX_BYTES: usize = MAX_PASSWORD_BYTES;
pub const ROLE_VALUES: &[&str] = &["user", "admin"];

/// A single raw value as it arrived from the client.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Object, array, bracket-notation key or repeated key.
    Structured,
}

/// Field name to raw value mapping, before any validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawInput {
    fields: BTreeMap<String, FieldValue>,
}

impl RawInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_text(self, name: &str, value: &str) -> Self {
        self.with(name, FieldValue::Text(value.to_string()))
    }

    /// Insert a value; a second value for the same name makes it structured.
    pub fn insert(&mut self, name: &str, value: FieldValue) {
        match self.fields.get_mut(name) {
            Some(existing) => *existing = FieldValue::Structured,
            None => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse `application/x-www-form-urlencoded` data (bodies and query strings).
    ///
    /// `user[$ne]=x` and `user[]=x` are recorded as a structured `user`, the
    /// same way extended query parsers would have built a nested object.
    #[must_use]
    pub fn from_urlencoded(data: &[u8]) -> Self {
        let mut input = Self::new();
        for (key, value) in url::form_urlencoded::parse(data) {
            match key.find('[') {
                Some(0) => continue,
                Some(index) => input.insert(&key[..index], FieldValue::Structured),
                None => input.insert(&key, FieldValue::Text(value.into_owned())),
            }
        }
        input
    }

    /// Build from a JSON document. Only objects are accepted.
    ///
    /// # Errors
    /// Returns a malformed-body validation error for invalid JSON or non-object documents.
    pub fn from_json(data: &[u8]) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_slice(data).map_err(|_| ValidationError::malformed_body())?;
        let Value::Object(map) = value else {
            return Err(ValidationError::malformed_body());
        };

        let mut input = Self::new();
        for (key, value) in map {
            let field = match value {
                // JSON null is treated the same as an absent field.
                Value::Null => continue,
                Value::String(text) => FieldValue::Text(text),
                Value::Bool(flag) => FieldValue::Bool(flag),
                Value::Number(number) => match number.as_f64() {
                    Some(number) => FieldValue::Number(number),
                    None => FieldValue::Structured,
                },
                Value::Array(_) | Value::Object(_) => FieldValue::Structured,
            };
            input.insert(&key, field);
        }
        Ok(input)
    }

    /// Parse a request body according to its content type.
    ///
    /// Anything that is not JSON is read as a urlencoded form, which is what
    /// HTML forms submit.
    ///
    /// # Errors
    /// Returns a malformed-body validation error when a JSON body cannot be parsed.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self, ValidationError> {
        let is_json = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .is_some_and(|mime| mime.eq_ignore_ascii_case("application/json"));
        if is_json {
            Self::from_json(body)
        } else {
            Ok(Self::from_urlencoded(body))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Any,
    Email,
    Alphanumeric,
    OneOf(&'static [&'static str]),
}

/// Rule for a single field of a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldRule {
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    max_len: Option<usize>,
    max_bytes: Option<usize>,
    required: bool,
    format: Format,
}

impl FieldRule {
    /// Required text field with no length limit and no format.
    #[must_use]
    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            max_len: None,
            max_bytes: None,
            required: true,
            format: Format::Any,
        }
    }

    /// Required numeric field; numeric text is coerced.
    #[must_use]
    pub const fn number(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Number,
            max_len: None,
            max_bytes: None,
            required: true,
            format: Format::Any,
        }
    }

    #[must_use]
    pub const fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Cap on the UTF-8 encoded length, checked after the character limit.
    #[must_use]
    pub const fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub const fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, value: &FieldValue) -> Result<ValidValue, IssueKind> {
        match (self.kind, value) {
            (_, FieldValue::Structured) => Err(IssueKind::Injection),
            (_, FieldValue::Bool(_)) | (FieldKind::Text, FieldValue::Number(_)) => {
                Err(IssueKind::WrongType {
                    expected: self.kind,
                })
            }
            (FieldKind::Number, FieldValue::Number(number)) => Ok(ValidValue::Number(*number)),
            (FieldKind::Number, FieldValue::Text(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .map(ValidValue::Number)
                .ok_or(IssueKind::WrongType {
                    expected: FieldKind::Number,
                }),
            (FieldKind::Text, FieldValue::Text(text)) => self.check_text(text),
        }
    }

    fn check_text(&self, text: &str) -> Result<ValidValue, IssueKind> {
        if let Some(max) = self.max_len {
            if text.chars().count() > max {
                return Err(IssueKind::TooLong { max });
            }
        }
        if let Some(max_bytes) = self.max_bytes {
            if text.len() > max_bytes {
                return Err(IssueKind::TooManyBytes { max_bytes });
            }
        }
        let valid_format = match self.format {
            Format::Any => true,
            Format::Email => valid_email(text),
            Format::Alphanumeric => text.chars().all(|c| c.is_ascii_alphanumeric()),
            Format::OneOf(allowed) => allowed.contains(&text),
        };
        if valid_format {
            Ok(ValidValue::Text(text.to_string()))
        } else {
            Err(IssueKind::Format)
        }
    }

    fn message(&self, kind: &IssueKind) -> String {
        let label = self.label;
        match kind {
            IssueKind::Missing => format!("{label} is required"),
            IssueKind::Injection => format!("{label} must be a plain value"),
            IssueKind::WrongType {
                expected: FieldKind::Text,
            } => format!("{label} must be a string"),
            IssueKind::WrongType {
                expected: FieldKind::Number,
            } => format!("{label} must be a number"),
            IssueKind::TooLong { max } => format!("{label} must be at most {max} characters"),
            IssueKind::TooManyBytes { max_bytes } => {
                format!("{label} must be at most {max_bytes} bytes")
            }
            IssueKind::Format => match self.format {
                Format::Email => format!("{label} must be a valid email"),
                Format::Alphanumeric => format!("{label} must only contain letters and numbers"),
                Format::OneOf(allowed) => format!("{label} must be one of: {}", allowed.join(", ")),
                Format::Any => format!("{label} is invalid"),
            },
            IssueKind::Malformed => "Request body could not be parsed".to_string(),
        }
    }
}

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Basic `local@domain.tld` shape check.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .as_ref()
        .is_some_and(|regex| regex.is_match(email))
}

#[derive(Clone, Debug, Default)]
pub struct Schema {
    rules: Vec<FieldRule>,
}

impl Schema {
    #[must_use]
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }
}

pub const USERNAME_RULE: FieldRule = FieldRule::text("username", "Username")
    .max_len(USERNAME_MAX_LEN)
    .format(Format::Alphanumeric);
pub const EMAIL_RULE: FieldRule = FieldRule::text("email", "Email")
    .max_len(EMAIL_MAX_LEN)
    .format(Format::Email);
pub const PASSWORD_RULE: FieldRule = FieldRule::text("password", "Password")
    .max_len(PASSWORD_MAX_LEN)
    .max_bytes(PASSWORD_MAX_BYTES);
pub const ROLE_RULE: FieldRule = FieldRule::text("role", "Role").format(Format::OneOf(ROLE_VALUES));
pub const LOOKUP_USER_RULE: FieldRule = FieldRule::text("user", "User").max_len(USERNAME_MAX_LEN);

/// Schemas for each entry point.
pub mod schemas {
    use super::{EMAIL_RULE, LOOKUP_USER_RULE, PASSWORD_RULE, ROLE_RULE, Schema, USERNAME_RULE};

    #[must_use]
    pub fn signup() -> Schema {
        Schema::new(vec![USERNAME_RULE, EMAIL_RULE, PASSWORD_RULE])
    }

    #[must_use]
    pub fn login() -> Schema {
        Schema::new(vec![EMAIL_RULE, PASSWORD_RULE])
    }

    #[must_use]
    pub fn lookup() -> Schema {
        Schema::new(vec![LOOKUP_USER_RULE])
    }

    #[must_use]
    pub fn role_change() -> Schema {
        Schema::new(vec![USERNAME_RULE, ROLE_RULE])
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ValidValue {
    Text(String),
    Number(f64),
}

/// Values that passed a [`Schema`], keyed by field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidatedFields {
    values: BTreeMap<&'static str, ValidValue>,
}

impl ValidatedFields {
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ValidValue::Text(text) => Some(text),
            ValidValue::Number(_) => None,
        }
    }

    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            ValidValue::Number(number) => Some(*number),
            ValidValue::Text(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    Injection,
    WrongType { expected: FieldKind },
    TooLong { max: usize },
    TooManyBytes { max_bytes: usize },
    Format,
    Malformed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    #[serde(flatten)]
    pub kind: IssueKind,
    pub message: String,
}

impl FieldIssue {
    fn new(rule: &FieldRule, kind: IssueKind) -> Self {
        Self {
            field: rule.name,
            message: rule.message(&kind),
            kind,
        }
    }
}

/// Every offending field of a rejected input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    issues: Vec<FieldIssue>,
}

impl ValidationError {
    #[must_use]
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    #[must_use]
    pub fn malformed_body() -> Self {
        Self::new(vec![FieldIssue {
            field: "body",
            kind: IssueKind::Malformed,
            message: "Request body could not be parsed".to_string(),
        }])
    }

    /// Single issue for `field` with a caller-provided message.
    #[must_use]
    pub fn field(rule: &FieldRule, message: &str) -> Self {
        Self::new(vec![FieldIssue {
            field: rule.name,
            kind: IssueKind::Format,
            message: message.to_string(),
        }])
    }

    #[must_use]
    pub fn issues(&self) -> &[FieldIssue] {
        &self.issues
    }

    /// Names of the offending fields, in schema order.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.issues.iter().map(|issue| issue.field).collect()
    }

    /// True when any field carried a structured (query-operator shaped) value.
    #[must_use]
    pub fn is_injection(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.kind == IssueKind::Injection)
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join(". ")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ValidationError {}

fn is_absent(value: Option<&FieldValue>) -> bool {
    match value {
        None => true,
        Some(FieldValue::Text(text)) => text.is_empty(),
        Some(_) => false,
    }
}

/// Check `input` against `schema`.
///
/// When required fields are missing, the error lists exactly those fields and
/// nothing else. Otherwise every rule is checked and all failures reported.
///
/// # Errors
/// Returns a [`ValidationError`] describing each offending field.
pub fn validate(input: &RawInput, schema: &Schema) -> Result<ValidatedFields, ValidationError> {
    let missing: Vec<FieldIssue> = schema
        .rules()
        .iter()
        .filter(|rule| rule.required && is_absent(input.get(rule.name)))
        .map(|rule| FieldIssue::new(rule, IssueKind::Missing))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::new(missing));
    }

    let mut fields = ValidatedFields::default();
    let mut issues = Vec::new();
    for rule in schema.rules() {
        let value = match input.get(rule.name) {
            None => continue,
            Some(FieldValue::Text(text)) if text.is_empty() => continue,
            Some(value) => value,
        };
        match rule.check(value) {
            Ok(valid) => {
                fields.values.insert(rule.name, valid);
            }
            Err(kind) => issues.push(FieldIssue::new(rule, kind)),
        }
    }

    if issues.is_empty() {
        Ok(fields)
    } else {
        Err(ValidationError::new(issues))
    }
}
