//! Value types shared by the reconciler, the resource kinds and the provider.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::sql;
use crate::error::ProviderError;
use crate::validation::validate_identifier;

/// Wire encoding of a value that is not known until after apply.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// A tri-state attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue<T> {
    /// Explicitly set.
    Known(T),
    /// Absent or null.
    Unset,
    /// To be computed by the provider.
    Pending,
}

impl<T> AttrValue<T> {
    /// Whether the value is known.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Whether the value is still to be computed.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The known value, if any.
    pub fn known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow the contained value.
    pub fn as_ref(&self) -> AttrValue<&T> {
        match self {
            Self::Known(v) => AttrValue::Known(v),
            Self::Unset => AttrValue::Unset,
            Self::Pending => AttrValue::Pending,
        }
    }
}

/// A bag of resource attributes as exchanged with the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
    /// Create an empty attribute bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. `null` yields an empty bag.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(ProviderError::InvalidRequest(format!(
                "expected an object of attributes, got {}",
                other
            ))),
        }
    }

    /// Convert into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Raw JSON value of an attribute.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether an attribute is still to be computed.
    pub fn is_pending(&self, name: &str) -> bool {
        matches!(self.0.get(name), Some(Value::String(s)) if s == UNKNOWN_VALUE)
    }

    /// Tri-state string accessor.
    pub fn string(&self, name: &str) -> AttrValue<String> {
        match self.0.get(name) {
            None | Some(Value::Null) => AttrValue::Unset,
            Some(Value::String(s)) if s == UNKNOWN_VALUE => AttrValue::Pending,
            Some(Value::String(s)) => AttrValue::Known(s.clone()),
            Some(other) => AttrValue::Known(other.to_string()),
        }
    }

    /// Tri-state list-of-strings accessor. Non-string elements are skipped.
    pub fn string_list(&self, name: &str) -> AttrValue<Vec<String>> {
        match self.0.get(name) {
            None | Some(Value::Null) => AttrValue::Unset,
            Some(Value::String(s)) if s == UNKNOWN_VALUE => AttrValue::Pending,
            Some(Value::Array(items)) => AttrValue::Known(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            Some(_) => AttrValue::Unset,
        }
    }

    /// Tri-state map-of-strings accessor. Non-string values are skipped.
    pub fn string_map(&self, name: &str) -> AttrValue<BTreeMap<String, String>> {
        match self.0.get(name) {
            None | Some(Value::Null) => AttrValue::Unset,
            Some(Value::String(s)) if s == UNKNOWN_VALUE => AttrValue::Pending,
            Some(Value::Object(map)) => AttrValue::Known(
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect(),
            ),
            Some(_) => AttrValue::Unset,
        }
    }

    /// Set an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Set an attribute, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Mark an attribute as still to be computed.
    pub fn set_pending(&mut self, name: impl Into<String>) {
        self.0
            .insert(name.into(), Value::String(UNKNOWN_VALUE.to_string()));
    }

    /// Overwrite attributes with every value present in `other`.
    pub fn merge(&mut self, other: &Attributes) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Replace any value still pending with null.
    pub fn resolve_pending(&mut self) {
        for value in self.0.values_mut() {
            if matches!(value, Value::String(s) if s == UNKNOWN_VALUE) {
                *value = Value::Null;
            }
        }
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// The immutable key fields addressing one remote object, in scope order
/// (e.g. database, schema, name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    parts: Vec<(String, String)>,
}

impl Identity {
    /// Create an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key part.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((key.into(), value.into()));
        self
    }

    /// Extract an identity from attributes. Every named attribute must be
    /// known and a legal identifier.
    pub fn from_attributes(names: &[&str], attrs: &Attributes) -> Result<Self, ProviderError> {
        let mut identity = Self::new();
        for name in names {
            let value = match attrs.string(name) {
                AttrValue::Known(v) => v,
                AttrValue::Pending => {
                    return Err(ProviderError::Validation(format!(
                        "'{}' must be known before the object can be managed",
                        name
                    )))
                }
                AttrValue::Unset => {
                    return Err(ProviderError::Validation(format!(
                        "missing required identity attribute '{}'",
                        name
                    )))
                }
            };
            if let Some(diag) = validate_identifier(name, &value) {
                return Err(ProviderError::Validation(
                    diag.detail.unwrap_or(diag.summary),
                ));
            }
            identity = identity.with(*name, value);
        }
        Ok(identity)
    }

    /// Parse an import id (`db.schema.name`) against the identity attribute names.
    pub fn parse(names: &[&str], id: &str) -> Result<Self, ProviderError> {
        let values = sql::split_qualified(id);
        if values.len() != names.len() {
            return Err(ProviderError::InvalidRequest(format!(
                "expected an id of the form {}, got '{}'",
                names.join("."),
                id
            )));
        }
        let attrs = names
            .iter()
            .zip(values)
            .fold(Attributes::new(), |attrs, (name, value)| attrs.with(*name, value));
        Self::from_attributes(names, &attrs)
    }

    /// Value of a key part.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The part values in order.
    pub fn values(&self) -> Vec<&str> {
        self.parts.iter().map(|(_, v)| v.as_str()).collect()
    }

    /// The quoted, fully qualified SQL name.
    pub fn qualified(&self) -> String {
        sql::qualified(&self.values())
    }

    /// The key parts as attributes.
    pub fn to_attributes(&self) -> Attributes {
        self.parts
            .iter()
            .fold(Attributes::new(), |attrs, (k, v)| attrs.with(k.clone(), v.clone()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values().join("."))
    }
}

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute name.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if removing).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Diff two attribute bags. Attributes pending in `planned` are reported
    /// as changes only when `prior` has no value for them.
    pub fn diff(prior: &Attributes, planned: &Attributes) -> Vec<Self> {
        let mut names: Vec<&String> = prior.0.keys().chain(planned.0.keys()).collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let before = prior.0.get(name).filter(|v| !v.is_null());
                let after = planned.0.get(name).filter(|v| !v.is_null());
                if before == after || (before.is_some() && planned.is_pending(name)) {
                    return None;
                }
                Some(Self {
                    path: name.clone(),
                    before: before.cloned(),
                    after: after.cloned(),
                })
            })
            .collect()
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
}

impl PlanResult {
    /// A plan with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
        }
    }

    /// A plan with changes.
    pub fn with_changes(planned_state: Value, changes: Vec<AttributeChange>) -> Self {
        Self {
            planned_state,
            changes,
        }
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Resource and data source names offered by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names.
    pub resources: Vec<String>,
    /// Data source type names.
    pub data_sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tri_state_strings() {
        let attrs = Attributes::from_value(json!({
            "name": "db1",
            "owner": UNKNOWN_VALUE,
            "comment": null,
        }))
        .unwrap();

        assert_eq!(attrs.string("name"), AttrValue::Known("db1".to_string()));
        assert_eq!(attrs.string("owner"), AttrValue::Pending);
        assert_eq!(attrs.string("comment"), AttrValue::Unset);
        assert_eq!(attrs.string("absent"), AttrValue::Unset);
        assert!(attrs.is_pending("owner"));
    }

    #[test]
    fn test_collections() {
        let attrs = Attributes::new()
            .with("uris", json!(["a:1", "b:2"]))
            .with("properties", json!({"k": "v", "n": 1}))
            .with("later", UNKNOWN_VALUE);

        assert_eq!(
            attrs.string_list("uris").known(),
            Some(vec!["a:1".to_string(), "b:2".to_string()])
        );
        let props = attrs.string_map("properties").known().unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props["k"], "v");
        assert!(attrs.string_list("later").is_pending());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Attributes::from_value(json!(null)).is_ok());
        assert!(matches!(
            Attributes::from_value(json!([1, 2])),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_merge_and_resolve() {
        let mut desired = Attributes::new()
            .with("name", "db1")
            .with("owner", UNKNOWN_VALUE)
            .with("created_at", UNKNOWN_VALUE);
        let observed = Attributes::new().with("owner", "sysadmin");

        desired.merge(&observed);
        desired.resolve_pending();

        assert_eq!(desired.raw("owner"), Some(&json!("sysadmin")));
        assert_eq!(desired.raw("created_at"), Some(&Value::Null));
        assert_eq!(desired.raw("name"), Some(&json!("db1")));
    }

    #[test]
    fn test_identity_from_attributes() {
        let attrs = Attributes::new().with("database", "db").with("name", "s1");
        let identity = Identity::from_attributes(&["database", "name"], &attrs).unwrap();

        assert_eq!(identity.get("database"), Some("db"));
        assert_eq!(identity.to_string(), "db.s1");
        assert_eq!(identity.qualified(), "\"db\".\"s1\"");
        assert_eq!(identity.to_attributes(), attrs);
    }

    #[test]
    fn test_identity_requires_known_values() {
        let pending = Attributes::new().with("name", UNKNOWN_VALUE);
        assert!(matches!(
            Identity::from_attributes(&["name"], &pending),
            Err(ProviderError::Validation(_))
        ));

        let empty = Attributes::new().with("name", "");
        assert!(matches!(
            Identity::from_attributes(&["name"], &empty),
            Err(ProviderError::Validation(_))
        ));

        assert!(Identity::from_attributes(&["name"], &Attributes::new()).is_err());
    }

    #[test]
    fn test_identity_parse() {
        let identity = Identity::parse(&["database", "schema", "name"], "db.s.r").unwrap();
        assert_eq!(identity.values(), vec!["db", "s", "r"]);

        assert!(matches!(
            Identity::parse(&["database", "name"], "db.s.r"),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_attribute_diff() {
        let prior = Attributes::new()
            .with("name", "db1")
            .with("owner", "sysadmin")
            .with("uris", "a:1");
        let planned = Attributes::new()
            .with("name", "db1")
            .with("owner", UNKNOWN_VALUE)
            .with("uris", "b:2")
            .with("comment", "new");

        let changes = AttributeChange::diff(&prior, &planned);
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["comment", "uris"]);
        assert_eq!(changes[0].before, None);
        assert_eq!(changes[1].after, Some(json!("b:2")));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"name": "db1"}));
        assert!(no_change.changes.is_empty());

        let imported = ImportedResource::new("streamsql_database", json!({"name": "db1"}));
        assert_eq!(imported.state["name"], "db1");
    }
}
