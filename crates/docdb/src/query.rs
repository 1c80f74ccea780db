//! Predicates over documents.
//!
//! A [`Predicate`] describes which documents a query selects. It has two
//! interpretations that must agree:
//!
//! - [`Predicate::to_sql`] compiles it to a parameterised SQL query for the
//!   document service (`SELECT * FROM root WHERE ...`);
//! - [`Predicate::matches`] evaluates it against a JSON document in process,
//!   following the service's SQL semantics: a comparison involving a missing
//!   field, or values of different JSON types, is *undefined*, and a document
//!   is selected only when the whole predicate is `true`.
//!
//! # Example
//!
//! ```
//! use helios_docdb::query::field;
//! use serde_json::json;
//!
//! let open_items = field("isComplete").eq(false);
//! let milk = open_items.clone().and(field("name").contains("milk"));
//!
//! assert!(milk.matches(&json!({"name": "buy milk", "isComplete": false})));
//! assert!(!milk.matches(&json!({"name": "buy milk", "isComplete": true})));
//!
//! let sql = milk.to_sql();
//! assert_eq!(
//!     sql.query,
//!     "SELECT * FROM root WHERE (root[\"isComplete\"] = @p0 AND CONTAINS(root[\"name\"], @p1))"
//! );
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::types::{SqlParameter, SqlQuerySpec};

/// Alias used for the document in generated SQL.
const ROOT: &str = "root";

/// A dotted path into a document, e.g. `address.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Parses a dotted path. Empty segments are ignored.
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Resolves the path in `document`, returning `None` when any segment is missing.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(document, |current, segment| current.get(segment))
    }

    fn to_sql(&self) -> String {
        let mut out = String::from(ROOT);
        for segment in &self.0 {
            out.push('[');
            out.push_str(&Value::String(segment.clone()).to_string());
            out.push(']');
        }
        out
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// String functions usable in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    /// `CONTAINS(field, value)`
    Contains,
    /// `STARTSWITH(field, value)`
    StartsWith,
    /// `ENDSWITH(field, value)`
    EndsWith,
}

impl StringOp {
    fn as_sql(self) -> &'static str {
        match self {
            StringOp::Contains => "CONTAINS",
            StringOp::StartsWith => "STARTSWITH",
            StringOp::EndsWith => "ENDSWITH",
        }
    }
}

/// A filter over documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Selects every document.
    All,
    /// `field <op> value`
    Compare {
        /// Compared field.
        field: FieldPath,
        /// Operator.
        op: CompareOp,
        /// Right-hand operand.
        value: Value,
    },
    /// A string function applied to a field.
    Text {
        /// String field.
        field: FieldPath,
        /// Function.
        op: StringOp,
        /// Argument.
        value: String,
    },
    /// `ARRAY_CONTAINS(field, value)`
    ArrayContains {
        /// Array field.
        field: FieldPath,
        /// Element to look for.
        value: Value,
    },
    /// `IS_DEFINED(field)`
    IsDefined(FieldPath),
    /// Conjunction; empty is `true`.
    And(Vec<Predicate>),
    /// Disjunction; empty is `false`.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

/// Starts a predicate on the field at `path`.
pub fn field(path: &str) -> Field {
    Field(FieldPath::parse(path))
}

/// Builder returned by [`field`].
#[derive(Debug, Clone)]
pub struct Field(FieldPath);

impl Field {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    fn text(self, op: StringOp, value: impl Into<String>) -> Predicate {
        Predicate::Text {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    /// `field = value`
    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    /// `field != value`
    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    /// `field < value`
    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    /// `field <= value`
    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    /// `field > value`
    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    /// `field >= value`
    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    /// The string field contains `value`.
    pub fn contains(self, value: impl Into<String>) -> Predicate {
        self.text(StringOp::Contains, value)
    }

    /// The string field starts with `value`.
    pub fn starts_with(self, value: impl Into<String>) -> Predicate {
        self.text(StringOp::StartsWith, value)
    }

    /// The string field ends with `value`.
    pub fn ends_with(self, value: impl Into<String>) -> Predicate {
        self.text(StringOp::EndsWith, value)
    }

    /// The array field contains an element equal to `value`.
    pub fn array_contains(self, value: impl Into<Value>) -> Predicate {
        Predicate::ArrayContains {
            field: self.0,
            value: value.into(),
        }
    }

    /// The field is present (any value, `null` included).
    pub fn is_defined(self) -> Predicate {
        Predicate::IsDefined(self.0)
    }
}

impl Predicate {
    /// Selects every document.
    pub fn all() -> Self {
        Predicate::All
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(mut right)) => {
                right.insert(0, p);
                Predicate::And(right)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    /// `self OR other`, flattening nested disjunctions.
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, _) | (_, Predicate::All) => Predicate::All,
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (p, Predicate::Or(mut right)) => {
                right.insert(0, p);
                Predicate::Or(right)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    /// Returns `true` if `document` is selected.
    pub fn matches(&self, document: &Value) -> bool {
        self.evaluate(document) == Some(true)
    }

    /// Three-valued evaluation; `None` is SQL *undefined*.
    pub fn evaluate(&self, document: &Value) -> Option<bool> {
        match self {
            Predicate::All => Some(true),
            Predicate::Compare { field, op, value } => {
                let actual = field.resolve(document)?;
                compare_values(actual, value).map(|ordering| op.holds(ordering))
            }
            Predicate::Text { field, op, value } => {
                let actual = field.resolve(document)?.as_str()?;
                Some(match op {
                    StringOp::Contains => actual.contains(value.as_str()),
                    StringOp::StartsWith => actual.starts_with(value.as_str()),
                    StringOp::EndsWith => actual.ends_with(value.as_str()),
                })
            }
            Predicate::ArrayContains { field, value } => {
                let items = field.resolve(document)?.as_array()?;
                Some(
                    items
                        .iter()
                        .any(|item| compare_values(item, value) == Some(Ordering::Equal)),
                )
            }
            Predicate::IsDefined(field) => Some(field.resolve(document).is_some()),
            Predicate::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.evaluate(document) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => result = None,
                    }
                }
                result
            }
            Predicate::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.evaluate(document) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => result = None,
                    }
                }
                result
            }
            Predicate::Not(inner) => inner.evaluate(document).map(|b| !b),
        }
    }

    /// Compiles the predicate to a parameterised query over the whole collection.
    pub fn to_sql(&self) -> SqlQuerySpec {
        let mut parameters = Vec::new();
        let query = match self {
            Predicate::All => format!("SELECT * FROM {ROOT}"),
            predicate => format!(
                "SELECT * FROM {ROOT} WHERE {}",
                predicate.render(&mut parameters)
            ),
        };
        SqlQuerySpec { query, parameters }
    }

    fn render(&self, parameters: &mut Vec<SqlParameter>) -> String {
        match self {
            Predicate::All => "true".to_string(),
            Predicate::Compare { field, op, value } => {
                let param = bind(parameters, value.clone());
                format!("{} {} {}", field.to_sql(), op.as_sql(), param)
            }
            Predicate::Text { field, op, value } => {
                let param = bind(parameters, Value::String(value.clone()));
                format!("{}({}, {})", op.as_sql(), field.to_sql(), param)
            }
            Predicate::ArrayContains { field, value } => {
                let param = bind(parameters, value.clone());
                format!("ARRAY_CONTAINS({}, {})", field.to_sql(), param)
            }
            Predicate::IsDefined(field) => format!("IS_DEFINED({})", field.to_sql()),
            Predicate::And(parts) if parts.is_empty() => "true".to_string(),
            Predicate::Or(parts) if parts.is_empty() => "false".to_string(),
            Predicate::And(parts) => join(parts, " AND ", parameters),
            Predicate::Or(parts) => join(parts, " OR ", parameters),
            Predicate::Not(inner) => format!("NOT ({})", inner.render(parameters)),
        }
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Self::Output {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

fn bind(parameters: &mut Vec<SqlParameter>, value: Value) -> String {
    let name = format!("@p{}", parameters.len());
    parameters.push(SqlParameter {
        name: name.clone(),
        value,
    });
    name
}

fn join(parts: &[Predicate], separator: &str, parameters: &mut Vec<SqlParameter>) -> String {
    let rendered: Vec<String> = parts.iter().map(|p| p.render(parameters)).collect();
    format!("({})", rendered.join(separator))
}

/// Orders two JSON values of the same type; `None` when they are not comparable.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (left == right).then_some(Ordering::Equal)
        }
        _ => None,
    }
}
