//! Resource kinds managed by the provider.
//!
//! Each kind is a stateless value implementing [`ResourceKind`]: it knows how
//! to build its statements, how to recognise its row in a listing, and which
//! lifecycle states count as terminal. The generic
//! [`Reconciler`](crate::reconciler::Reconciler) does the rest.

pub mod database;
pub mod namespace;
pub mod query;
pub mod relation;
pub mod schema_registry;
pub mod secret;
pub mod store;

use std::collections::BTreeMap;

use crate::catalog::{ErrorCode, Row, SessionContext, Statement};
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, ProviderSchema, Schema};
use crate::types::{AttrValue, Attributes, Identity};

/// Prefix of every resource and data source type name.
pub const TYPE_PREFIX: &str = "streamsql_";

/// Whether an observed object has reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// In the expected terminal state.
    Ready,
    /// Still transitioning; carries the observed state.
    Pending(String),
    /// In a state it will not leave on its own.
    Failed(String),
}

/// A kind of remote object.
pub trait ResourceKind: Send + Sync + 'static {
    /// Singular kind name, e.g. `database`.
    fn kind(&self) -> &'static str;

    /// Plural kind name used by the list data source, e.g. `databases`.
    fn plural(&self) -> &'static str;

    /// Resource schema, identity attributes included.
    fn schema(&self) -> Schema;

    /// Attributes forming the identity, outermost scope first.
    fn identity_attributes(&self) -> &'static [&'static str];

    /// Identity attributes naming the enclosing scope (e.g. `database` for a schema).
    fn scope_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Error codes meaning "this object (or its scope) does not exist".
    fn absent_codes(&self) -> &'static [ErrorCode];

    /// Message prefix for provisioning failures, e.g. "query failed to start".
    fn failed_to_provision(&self) -> &'static str;

    /// Resource type name, e.g. `streamsql_database`.
    fn type_name(&self) -> String {
        format!("{}{}", TYPE_PREFIX, self.kind())
    }

    /// Identity declared by the caller before provisioning. `None` when the
    /// catalog assigns it.
    fn declared_identity(&self, desired: &Attributes) -> Result<Option<Identity>, ProviderError> {
        Identity::from_attributes(self.identity_attributes(), desired).map(Some)
    }

    /// Identity of an object already tracked in state.
    fn identity(&self, state: &Attributes) -> Result<Identity, ProviderError> {
        Identity::from_attributes(self.identity_attributes(), state)
    }

    /// The object that must exist before this one can be created.
    fn parent(&self, _identity: &Identity) -> Option<(&'static dyn ResourceKind, Identity)> {
        None
    }

    /// Session context for statements about this object. The owner, when
    /// known, becomes the active role; scope parts become the active
    /// database and schema.
    fn session(
        &self,
        identity: Option<&Identity>,
        attrs: &Attributes,
        base: &SessionContext,
    ) -> SessionContext {
        let mut session = base.clone();
        if let AttrValue::Known(owner) = attrs.string("owner") {
            session.role = Some(owner);
        }
        if let Some(identity) = identity {
            for scope in self.scope_attributes() {
                match (*scope, identity.get(scope)) {
                    ("database", Some(db)) => session.database = Some(db.to_string()),
                    ("schema", Some(schema)) => session.schema = Some(schema.to_string()),
                    _ => {}
                }
            }
        }
        session
    }

    /// Dry-run statement whose rows describe what the create statement targets.
    fn plan_statement(&self, _desired: &Attributes) -> Result<Option<Statement>, ProviderError> {
        Ok(None)
    }

    /// Check dry-run rows against the declared identity. Returns attributes
    /// learned from the plan.
    fn check_plan(
        &self,
        _declared: Option<&Identity>,
        _desired: &Attributes,
        _plan: &[Row],
    ) -> Result<Attributes, ProviderError> {
        Ok(Attributes::new())
    }

    /// Statement creating the object.
    fn create_statement(
        &self,
        identity: Option<&Identity>,
        desired: &Attributes,
    ) -> Result<Statement, ProviderError>;

    /// Identity of the object just created.
    fn created_identity(
        &self,
        declared: Option<Identity>,
        _created: &[Row],
    ) -> Result<Identity, ProviderError> {
        declared.ok_or_else(|| {
            ProviderError::FailedPrecondition(format!(
                "the catalog did not report an identity for the new {}",
                self.kind()
            ))
        })
    }

    /// Statement listing every object in `scope`. Only the scope parts of
    /// `scope` are read.
    fn list_statement(&self, scope: &Identity) -> Statement;

    /// Whether a listed row is the object with the given identity.
    fn matches(&self, identity: &Identity, row: &Row) -> bool {
        identity.values().last().copied() == row.text("name")
    }

    /// Map a listed row to observed attributes.
    fn observe(&self, row: &Row) -> Attributes;

    /// Terminal-state predicate for provisioning.
    fn readiness(&self, _observed: &Attributes) -> Readiness {
        Readiness::Ready
    }

    /// Whether a still-listed object counts as deleted.
    fn is_deleted(&self, _observed: &Attributes) -> bool {
        false
    }

    /// Statement removing the object.
    fn drop_statement(&self, identity: &Identity, attrs: &Attributes) -> Statement;

    /// Statement applying changes to updatable attributes.
    fn update_statement(
        &self,
        _identity: &Identity,
        _prior: &Attributes,
        _planned: &Attributes,
    ) -> Result<Option<Statement>, ProviderError> {
        Ok(None)
    }
}

/// Readiness from a `state` column compared against the expected terminal
/// value; any of `failed` is terminal failure.
pub(crate) fn state_readiness(observed: &Attributes, ready: &str, failed: &[&str]) -> Readiness {
    match observed.string("state").known() {
        Some(state) if state.eq_ignore_ascii_case(ready) => Readiness::Ready,
        Some(state) if failed.iter().any(|f| state.eq_ignore_ascii_case(f)) => {
            Readiness::Failed(state)
        }
        Some(state) => Readiness::Pending(state),
        None => Readiness::Pending("unknown".to_string()),
    }
}

/// Copy the named columns of a row into attributes, as `(column, attribute)`
/// pairs. Columns the row does not carry are left out.
pub(crate) fn copy_columns(row: &Row, columns: &[(&str, &str)]) -> Attributes {
    columns
        .iter()
        .filter_map(|(column, attr)| row.get(column).map(|v| (*attr, v.to_json())))
        .fold(Attributes::new(), |attrs, (attr, value)| attrs.with(attr, value))
}

/// The computed part of an observation. Attributes the user sets keep their
/// configured value; the catalog may report them normalized.
pub(crate) fn computed_view(kind: &dyn ResourceKind, observed: &Attributes) -> Attributes {
    let schema = kind.schema();
    observed
        .iter()
        .filter(|(name, _)| schema.attribute(name).is_some_and(|attr| attr.flags.computed))
        .fold(Attributes::new(), |attrs, (name, value)| {
            attrs.with(name.as_str(), value.clone())
        })
}

/// Columns every listing reports, as `(column, attribute)` pairs.
pub(crate) const COMMON_COLUMNS: [(&str, &str); 4] = [
    ("name", "name"),
    ("owner", "owner"),
    ("created_at", "created_at"),
    ("updated_at", "updated_at"),
];

/// The declared identity, which every kind except queries has.
pub(crate) fn declared(identity: Option<&Identity>) -> Result<&Identity, ProviderError> {
    identity.ok_or_else(|| {
        ProviderError::InvalidRequest("the identity must be known before provisioning".to_string())
    })
}

/// A string attribute that must be known to build a statement.
pub(crate) fn known_string(
    kind: &dyn ResourceKind,
    attrs: &Attributes,
    name: &str,
) -> Result<String, ProviderError> {
    match attrs.string(name) {
        AttrValue::Known(value) => Ok(value),
        AttrValue::Pending => Err(ProviderError::Validation(format!(
            "'{}' must be known before the {} can be created",
            name,
            kind.kind()
        ))),
        AttrValue::Unset => Err(ProviderError::Validation(format!(
            "missing required attribute '{}'",
            name
        ))),
    }
}

/// An enumeration value rendered verbatim into a statement, e.g. `KAFKA`.
pub(crate) fn keyword(name: &str, value: &str) -> Result<String, ProviderError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ProviderError::Validation(format!(
            "'{}' must be a single word of letters, digits and underscores, got '{}'",
            name, value
        )));
    }
    Ok(value.to_ascii_uppercase())
}

/// Attributes every kind reports for its owner and timestamps.
pub(crate) fn with_common_attributes(schema: Schema) -> Schema {
    schema
        .with_attribute(
            "owner",
            Attribute::optional_computed_string()
                .with_description("Role owning the object; defaults to the provider role"),
        )
        .with_attribute("created_at", Attribute::computed_string())
        .with_attribute("updated_at", Attribute::computed_string())
}

/// Schema of the single-object data source derived from a resource schema:
/// identity attributes are required, everything else is computed.
pub fn lookup_schema(kind: &dyn ResourceKind) -> Schema {
    let identity = kind.identity_attributes();
    let mut schema = Schema::v0().with_description(format!("Look up one {}", kind.kind()));
    for (name, attr) in kind.schema().attributes {
        let flags = if identity.contains(&name.as_str()) {
            AttributeFlags::required()
        } else {
            AttributeFlags::computed()
        };
        let mut derived = Attribute::new(attr.attr_type, flags);
        derived.flags.sensitive = attr.flags.sensitive;
        derived.description = attr.description;
        schema = schema.with_attribute(name, derived);
    }
    schema
}

/// Schema of the list data source: scope attributes are required, the
/// objects come back under the plural name.
pub fn list_schema(kind: &dyn ResourceKind) -> Schema {
    let element: BTreeMap<String, AttributeType> = kind
        .schema()
        .attributes
        .into_iter()
        .filter(|(_, attr)| !attr.flags.sensitive)
        .map(|(name, attr)| (name, attr.attr_type))
        .collect();

    let mut schema = Schema::v0()
        .with_description(format!("List {}", kind.plural()))
        .with_attribute(
            kind.plural(),
            Attribute::new(
                AttributeType::list(AttributeType::Object(element)),
                AttributeFlags::computed(),
            ),
        );
    for scope in kind.scope_attributes() {
        schema = schema.with_attribute(*scope, Attribute::required_string());
    }
    schema
}

/// A data source offered by the provider.
#[derive(Clone, Copy)]
pub enum DataSource {
    /// Look up one object by identity.
    Lookup(&'static dyn ResourceKind),
    /// List the objects in a scope.
    List(&'static dyn ResourceKind),
}

impl DataSource {
    /// The data source schema.
    pub fn schema(&self) -> Schema {
        match self {
            Self::Lookup(kind) => lookup_schema(*kind),
            Self::List(kind) => list_schema(*kind),
        }
    }
}

/// Every resource kind, keyed by type name.
pub struct Registry {
    kinds: BTreeMap<String, &'static dyn ResourceKind>,
}

impl Registry {
    /// The kinds shipped with the provider.
    pub fn builtin() -> Self {
        let all: [&'static dyn ResourceKind; 7] = [
            &database::DATABASE,
            &namespace::SCHEMA,
            &relation::RELATION,
            &query::QUERY,
            &store::STORE,
            &secret::SECRET,
            &schema_registry::SCHEMA_REGISTRY,
        ];
        Self {
            kinds: all.into_iter().map(|k| (k.type_name(), k)).collect(),
        }
    }

    /// Look up a resource kind by type name.
    pub fn resource(&self, type_name: &str) -> Result<&'static dyn ResourceKind, ProviderError> {
        self.kinds
            .get(type_name)
            .copied()
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// Look up a data source by type name.
    pub fn data_source(&self, type_name: &str) -> Result<DataSource, ProviderError> {
        if let Some(kind) = self.kinds.get(type_name) {
            return Ok(DataSource::Lookup(*kind));
        }
        self.kinds
            .values()
            .find(|k| format!("{}{}", TYPE_PREFIX, k.plural()) == type_name)
            .map(|k| DataSource::List(*k))
            .ok_or_else(|| ProviderError::UnknownResource(format!("data source {}", type_name)))
    }

    /// Iterate over all kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &'static dyn ResourceKind> + '_ {
        self.kinds.values().copied()
    }

    /// Full provider schema: resources plus both data sources per kind.
    pub fn provider_schema(&self) -> ProviderSchema {
        self.kinds().fold(ProviderSchema::new(), |schema, kind| {
            schema
                .with_resource(kind.type_name(), kind.schema())
                .with_data_source(kind.type_name(), lookup_schema(kind))
                .with_data_source(format!("{}{}", TYPE_PREFIX, kind.plural()), list_schema(kind))
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
