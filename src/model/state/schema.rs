// SPDX-License-Identifier: MIT

//! Construct schemas
//!
//! A construct is a named record of typed fields. Tools declare one to have
//! their output checked, and stages use them to declare the fields that must
//! be in state before the stage can be entered.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::store::type_name;
use crate::model::error::ConstructError;

/// Named record schema
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Construct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Field definitions, in declaration order
    #[serde(default)]
    pub fields: Vec<ConstructField>,
}

/// Definition of a single construct field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConstructField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

fn default_required() -> bool {
    true
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl FieldType {
    /// Check whether a value has this type. `Number` accepts integers too.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Construct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a required field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(ConstructField {
            name: name.into(),
            field_type,
            required: true,
            description: String::new(),
        });
        self
    }

    /// Add an optional field
    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(ConstructField {
            name: name.into(),
            field_type,
            required: false,
            description: String::new(),
        });
        self
    }

    /// Names of the required fields
    pub fn required_fields(&self) -> impl Iterator<Item = &ConstructField> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Validate a value against this construct.
    ///
    /// The value must be an object, required fields must be present and not
    /// null, and every present field must match its declared type. Extra keys
    /// are allowed.
    pub fn validate(&self, value: &Value) -> Result<(), ConstructError> {
        let obj = value.as_object().ok_or_else(|| ConstructError::NotAnObject {
            construct: self.name.clone(),
            found: type_name(value).to_string(),
        })?;

        for field in &self.fields {
            match obj.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(ConstructError::MissingField {
                        construct: self.name.clone(),
                        field: field.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(v) if !field.field_type.matches(v) => {
                    return Err(ConstructError::TypeMismatch {
                        construct: self.name.clone(),
                        field: field.name.clone(),
                        expected: field.field_type,
                        found: type_name(v).to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stock() -> Construct {
        Construct::new("Stock")
            .field("symbol", FieldType::String)
            .field("quantity", FieldType::Integer)
            .optional("note", FieldType::String)
    }

    #[test]
    fn test_construct_deserialize() {
        let yaml = r#"
            name: Transaction
            description: Transaction result
            fields:
              - name: order_id
                type: string
              - name: status
                type: string
              - name: fee
                type: number
                required: false
        "#;
        let construct: Construct = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(construct.name, "Transaction");
        assert_eq!(construct.fields.len(), 3);
        assert_eq!(construct.fields[0].field_type, FieldType::String);
        assert!(construct.fields[0].required);
        assert!(!construct.fields[2].required);
        assert_eq!(construct.required_fields().count(), 2);
    }

    #[test]
    fn test_field_type_defaults_to_any() {
        let field: ConstructField = serde_yaml::from_str("name: payload").unwrap();
        assert_eq!(field.field_type, FieldType::Any);
        assert!(field.field_type.matches(&json!(null)));
    }

    #[test]
    fn test_validate_accepts_matching_value() {
        let value = json!({"symbol": "AAPL", "quantity": 10, "extra": true});
        assert!(stock().validate(&value).is_ok());
    }

    #[test]
    fn test_validate_missing_field() {
        let err = stock().validate(&json!({"symbol": "AAPL"})).unwrap_err();
        assert_eq!(
            err,
            ConstructError::MissingField {
                construct: "Stock".to_string(),
                field: "quantity".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_null_counts_as_missing() {
        let err = stock()
            .validate(&json!({"symbol": "AAPL", "quantity": null}))
            .unwrap_err();
        assert!(matches!(err, ConstructError::MissingField { .. }));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let err = stock()
            .validate(&json!({"symbol": "AAPL", "quantity": 2.5}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Stock.quantity should be integer, got number");
    }

    #[test]
    fn test_validate_rejects_non_object() {
        let err = stock().validate(&json!("AAPL")).unwrap_err();
        assert_eq!(err.to_string(), "Stock expects an object, got string");
    }

    #[test]
    fn test_number_accepts_integers() {
        assert!(FieldType::Number.matches(&json!(3)));
        assert!(FieldType::Number.matches(&json!(3.5)));
        assert!(!FieldType::Integer.matches(&json!(3.5)));
    }
}
