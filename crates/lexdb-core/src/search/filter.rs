//! Typed filter AST for `search_documents`'s `filters` parameter
//! (`spec.md` §4.5, §6), rendered to a SQL boolean expression spliced into
//! the generated scoring query.
//!
//! `spec.md` describes `filters` as "an optional SQL-expression"; this
//! implementation narrows that to a small allow-listed grammar (comparison
//! and logical operators over column identifiers and string/number/bool
//! literals) rather than accepting an opaque string, mirroring the typed
//! filter AST the teacher uses for its own metadata filters
//! (`filter.rs`/`Condition`) before rendering to a query. A caller-supplied
//! column name is checked against `corpus.schema::is_valid_identifier`
//! before it is spliced into SQL; literals are rendered through an escaping
//! helper rather than interpolated raw.

use serde::{Deserialize, Serialize};

use crate::corpus::schema::is_valid_identifier;
use crate::error::{Error, Result};

/// A literal value usable on the right-hand side of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    fn to_sql(&self) -> String {
        match self {
            Self::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Num(n) => n.to_string(),
            Self::Bool(b) => b.to_string().to_uppercase(),
        }
    }
}

/// A node of the filter expression tree (`spec.md` §4.5 `filters`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Eq { field: String, value: Value },
    Neq { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    IsNull { field: String },
    IsNotNull { field: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    fn render(&self) -> Result<String> {
        let check_field = |field: &str| -> Result<()> {
            if is_valid_identifier(field) {
                Ok(())
            } else {
                Err(Error::InvalidFilter(format!(
                    "'{field}' is not a valid column identifier"
                )))
            }
        };

        Ok(match self {
            Self::Eq { field, value } => {
                check_field(field)?;
                format!("{field} = {}", value.to_sql())
            }
            Self::Neq { field, value } => {
                check_field(field)?;
                format!("{field} != {}", value.to_sql())
            }
            Self::Gt { field, value } => {
                check_field(field)?;
                format!("{field} > {}", value.to_sql())
            }
            Self::Gte { field, value } => {
                check_field(field)?;
                format!("{field} >= {}", value.to_sql())
            }
            Self::Lt { field, value } => {
                check_field(field)?;
                format!("{field} < {}", value.to_sql())
            }
            Self::Lte { field, value } => {
                check_field(field)?;
                format!("{field} <= {}", value.to_sql())
            }
            Self::In { field, values } => {
                check_field(field)?;
                if values.is_empty() {
                    return Err(Error::InvalidFilter(format!(
                        "'{field} IN (...)' cannot be built from an empty value list"
                    )));
                }
                let list = values.iter().map(Value::to_sql).collect::<Vec<_>>().join(", ");
                format!("{field} IN ({list})")
            }
            Self::IsNull { field } => {
                check_field(field)?;
                format!("{field} IS NULL")
            }
            Self::IsNotNull { field } => {
                check_field(field)?;
                format!("{field} IS NOT NULL")
            }
            Self::And(conditions) => combine(conditions, "AND")?,
            Self::Or(conditions) => combine(conditions, "OR")?,
            Self::Not(inner) => format!("NOT ({})", inner.render()?),
        })
    }
}

fn combine(conditions: &[Condition], joiner: &str) -> Result<String> {
    if conditions.is_empty() {
        return Err(Error::InvalidFilter(format!(
            "'{joiner}' cannot combine an empty condition list"
        )));
    }
    let parts = conditions
        .iter()
        .map(Condition::render)
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "({})",
        parts.join(&format!(" {joiner} "))
    ))
}

/// A filter applied to the `documents` columns joined onto search hits
/// (`spec.md` §4.5 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub condition: Condition,
}

impl Filter {
    #[must_use]
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }

    /// Renders this filter to a SQL boolean expression suitable for a
    /// `WHERE` clause.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if a field name is not a valid
    /// column identifier, or a list-valued condition is empty.
    pub fn to_sql(&self) -> Result<String> {
        self.condition.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_simple_equality() {
        let f = Filter::new(Condition::Eq {
            field: "category".to_string(),
            value: Value::Str("tech".to_string()),
        });
        assert_eq!(f.to_sql().unwrap(), "category = 'tech'");
    }

    #[test]
    fn escapes_embedded_quotes() {
        let f = Filter::new(Condition::Eq {
            field: "title".to_string(),
            value: Value::Str("O'Brien".to_string()),
        });
        assert_eq!(f.to_sql().unwrap(), "title = 'O''Brien'");
    }

    #[test]
    fn rejects_invalid_column_identifier() {
        let f = Filter::new(Condition::Eq {
            field: "x; DROP TABLE documents".to_string(),
            value: Value::Num(1.0),
        });
        assert!(f.to_sql().is_err());
    }

    #[test]
    fn combines_and_or_not() {
        let f = Filter::new(Condition::And(vec![
            Condition::Gt {
                field: "price".to_string(),
                value: Value::Num(10.0),
            },
            Condition::Not(Box::new(Condition::IsNull {
                field: "category".to_string(),
            })),
        ]));
        assert_eq!(
            f.to_sql().unwrap(),
            "(price > 10 AND NOT (category IS NULL))"
        );
    }

    #[test]
    fn rejects_empty_in_list() {
        let f = Filter::new(Condition::In {
            field: "category".to_string(),
            values: vec![],
        });
        assert!(f.to_sql().is_err());
    }
}
