//! Resource specifications
//!
//! A [`ResourceSpec`] describes one resource kind as data: its field table,
//! where its identity comes from, which remote operations exist and how
//! their requests are shaped. Specs are built once at startup through
//! [`ResourceSpecBuilder`], which rejects inconsistent descriptors, and are
//! never mutated afterwards.
//!
//! ```
//! use reconcile::{DeleteOp, FieldSpec, IdentitySource, ResourceSpec, Route, WriteOp};
//!
//! let team = ResourceSpec::builder("team")
//!     .field(FieldSpec::string("name").required().wire("Name").reads("Name"))
//!     .identity(IdentitySource::response("Id"))
//!     .create(WriteOp::new(Route::post("/teams")))
//!     .read(Route::get("/teams/{id}"))
//!     .delete(DeleteOp::Remote(Route::delete("/teams/{id}")))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(team.kind(), "team");
//! ```

use crate::client::Response;
use crate::error::{Error, Result};
use crate::route::{PayloadBuilder, Route};
use crate::types::{DesiredState, Identity};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Semantic type of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Bool,
    IntList,
    StringList,
    StringMap,
    /// List of JSON objects, e.g. service ports
    ObjectList,
}

impl FieldType {
    /// Check whether a JSON value has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.as_i64().is_some(),
            Self::Bool => value.is_boolean(),
            Self::IntList => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.as_i64().is_some())),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::StringMap => value
                .as_object()
                .is_some_and(|map| map.values().all(Value::is_string)),
            Self::ObjectList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
        }
    }

    /// Convert a textual identity into a value of this type (or its element type)
    pub fn coerce_identity(self, raw: &str) -> Value {
        match self {
            Self::Int | Self::IntList => raw
                .parse::<i64>()
                .map_or_else(|_| Value::String(raw.to_string()), Value::from),
            _ => Value::String(raw.to_string()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::IntList => "list(int)",
            Self::StringList => "list(string)",
            Self::StringMap => "map(string)",
            Self::ObjectList => "list(object)",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a field can change without re-creating the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Immutable,
    Mutable,
}

/// Which side is the source of truth for a field's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Read back from the control plane
    Remote,
    /// Not reported by the control plane; the last local write wins
    Local,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Selects a remote attribute path from the value of a discriminant field.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    discriminant: String,
    cases: Vec<(Value, String)>,
    otherwise: Option<String>,
}

impl Branch {
    pub fn on(discriminant: impl Into<String>) -> Self {
        Self {
            discriminant: discriminant.into(),
            cases: Vec::new(),
            otherwise: None,
        }
    }

    pub fn case(mut self, value: impl Into<Value>, path: impl Into<String>) -> Self {
        self.cases.push((value.into(), path.into()));
        self
    }

    pub fn otherwise(mut self, path: impl Into<String>) -> Self {
        self.otherwise = Some(path.into());
        self
    }

    pub fn discriminant(&self) -> &str {
        &self.discriminant
    }

    /// Path for the given discriminant value, if any branch applies
    pub fn select(&self, value: Option<&Value>) -> Option<&str> {
        value
            .and_then(|v| self.cases.iter().find(|(case, _)| case == v))
            .map(|(_, path)| path.as_str())
            .or(self.otherwise.as_deref())
    }
}

/// Where the drift reader finds a field's observed value
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A fixed (dotted) attribute path in the remote payload
    Remote(String),
    /// An attribute path chosen by a discriminant field
    Discriminated(Branch),
    /// Not reported remotely
    Local,
}

/// Payload key a field is written under
#[derive(Debug, Clone, PartialEq)]
pub enum WireKey {
    Key(String),
    Discriminated(Branch),
}

/// One entry of a kind's field table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub mutability: Mutability,
    pub required: bool,
    pub default: Option<Value>,
    /// Produced by the remote or a compensation step; callers cannot set it
    pub computed: bool,
    pub sensitive: bool,
    pub wire: Option<WireKey>,
    pub source: Source,
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mutability: Mutability::Immutable,
            required: false,
            default: None,
            computed: false,
            sensitive: false,
            wire: None,
            source: Source::Local,
            description: String::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn int_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::IntList)
    }

    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::StringList)
    }

    pub fn string_map(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::StringMap)
    }

    pub fn object_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::ObjectList)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn mutable(mut self) -> Self {
        self.mutability = Mutability::Mutable;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Write this field under a fixed payload key
    pub fn wire(mut self, key: impl Into<String>) -> Self {
        self.wire = Some(WireKey::Key(key.into()));
        self
    }

    /// Write this field under a key chosen by a discriminant
    pub fn wire_by(mut self, branch: Branch) -> Self {
        self.wire = Some(WireKey::Discriminated(branch));
        self
    }

    /// Read this field back from a fixed remote path
    pub fn reads(mut self, path: impl Into<String>) -> Self {
        self.source = Source::Remote(path.into());
        self
    }

    /// Read this field back from a path chosen by a discriminant
    pub fn reads_by(mut self, branch: Branch) -> Self {
        self.source = Source::Discriminated(branch);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn authority(&self) -> Authority {
        match self.source {
            Source::Local => Authority::Local,
            _ => Authority::Remote,
        }
    }

    /// Payload key for this field given the instance's state
    pub fn write_key<'a>(&'a self, state: &DesiredState) -> Option<&'a str> {
        match self.wire.as_ref()? {
            WireKey::Key(key) => Some(key),
            WireKey::Discriminated(branch) => branch.select(state.get(branch.discriminant())),
        }
    }
}

/// Where a newly created resource's identity comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// A path in the create response; when absent, resolve by natural key
    Response(String),
    /// The value of a desired-state field
    Field(String),
    /// A constant, for singleton resources
    Fixed(String),
    /// `{field}` placeholders filled from desired state, e.g. `{endpoint_id}-{image}`
    Template(String),
}

impl IdentitySource {
    pub fn response(path: impl Into<String>) -> Self {
        Self::Response(path.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn fixed(id: impl Into<String>) -> Self {
        Self::Fixed(id.into())
    }

    pub fn template(template: impl Into<String>) -> Self {
        Self::Template(template.into())
    }

    /// Fill a template's placeholders; `None` when a referenced field is unset
    pub fn render_template(template: &str, state: &DesiredState) -> Option<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            let len = rest[start..].find('}')?;
            out.push_str(&rest[..start]);
            let value = match state.get(&rest[start + 1..start + len])? {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            out.push_str(&value);
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        Some(out)
    }
}

/// Create or update operation
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub route: Route,
    pub payload: PayloadBuilder,
    pub headers: Option<HeaderFn>,
    /// Runs on the success response before the identity is taken from it
    pub on_success: Option<ResponseFn>,
}

impl WriteOp {
    /// Route with the default payload (every writable field)
    pub fn new(route: Route) -> Self {
        Self::with_payload(route, PayloadBuilder::AllFields)
    }

    pub fn with_payload(route: Route, payload: PayloadBuilder) -> Self {
        Self {
            route,
            payload,
            headers: None,
            on_success: None,
        }
    }

    /// Extra request headers derived from desired state
    pub fn headers(mut self, build: HeaderFn) -> Self {
        self.headers = Some(build);
        self
    }

    /// Hand the success response to a kind-specific consumer
    pub fn after(mut self, consume: ResponseFn) -> Self {
        self.on_success = Some(consume);
        self
    }

    pub fn build_headers(
        &self,
        state: &DesiredState,
    ) -> std::result::Result<Vec<(String, String)>, String> {
        self.headers.map_or_else(|| Ok(Vec::new()), |build| build(state))
    }
}

/// How a resource is removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOp {
    /// Issue a remote request; 404 counts as success
    Remote(Route),
    /// The control plane has no delete; drop it from local tracking only
    Forget,
}

/// Builds the payload of a compensation step; `Ok(None)` skips the step
pub type StepPayloadFn =
    fn(&Identity, &DesiredState) -> std::result::Result<Option<crate::route::Payload>, String>;

/// Builds extra headers for a write, such as registry credentials
pub type HeaderFn = fn(&DesiredState) -> std::result::Result<Vec<(String, String)>, String>;

/// Consumes the success response of a write, such as a downloaded archive
pub type ResponseFn = fn(&DesiredState, &Response) -> std::result::Result<(), String>;

/// Kind-specific validation run after defaults are applied
pub type ValidateFn = fn(&DesiredState) -> std::result::Result<(), String>;

/// Secondary request issued after the primary create succeeded
#[derive(Debug, Clone)]
pub struct CompensationStep {
    pub name: String,
    pub route: Route,
    pub payload: StepPayloadFn,
    /// (computed field, response path) pairs captured from the step's response
    pub captures: Vec<(String, String)>,
}

impl CompensationStep {
    pub fn new(name: impl Into<String>, route: Route, payload: StepPayloadFn) -> Self {
        Self {
            name: name.into(),
            route,
            payload,
            captures: Vec::new(),
        }
    }

    pub fn capture(mut self, field: impl Into<String>, path: impl Into<String>) -> Self {
        self.captures.push((field.into(), path.into()));
        self
    }
}

/// Immutable descriptor of one resource kind
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    kind: String,
    description: String,
    fields: Vec<FieldSpec>,
    identity: IdentitySource,
    natural_key: Vec<String>,
    create: WriteOp,
    read: Option<Route>,
    read_via_list: bool,
    update: Option<WriteOp>,
    delete: DeleteOp,
    list: Option<Route>,
    importable: bool,
    compensation: Vec<CompensationStep>,
    validate: Option<ValidateFn>,
}

impl ResourceSpec {
    pub fn builder(kind: impl Into<String>) -> ResourceSpecBuilder {
        ResourceSpecBuilder::new(kind)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identity_source(&self) -> &IdentitySource {
        &self.identity
    }

    pub fn natural_key(&self) -> &[String] {
        &self.natural_key
    }

    pub fn create(&self) -> &WriteOp {
        &self.create
    }

    pub fn read(&self) -> Option<&Route> {
        self.read.as_ref()
    }

    /// Whether an unusable by-id read falls back to scanning the list
    pub fn reads_via_list(&self) -> bool {
        self.read_via_list
    }

    pub fn update(&self) -> Option<&WriteOp> {
        self.update.as_ref()
    }

    pub fn delete(&self) -> &DeleteOp {
        &self.delete
    }

    pub fn list(&self) -> Option<&Route> {
        self.list.as_ref()
    }

    pub fn is_importable(&self) -> bool {
        self.importable && self.read.is_some()
    }

    pub fn compensation(&self) -> &[CompensationStep] {
        &self.compensation
    }

    /// Apply defaults and check the caller's state against the field table
    pub fn normalize(&self, desired: &DesiredState) -> Result<DesiredState> {
        for (name, value) in desired.iter() {
            let Some(field) = self.field(name) else {
                return Err(Error::invalid_desired(
                    &self.kind,
                    format!("unknown field '{name}'"),
                ));
            };
            if field.computed {
                return Err(Error::invalid_desired(
                    &self.kind,
                    format!("field '{name}' is computed and cannot be set"),
                ));
            }
            if !field.field_type.accepts(value) {
                return Err(Error::invalid_desired(
                    &self.kind,
                    format!("field '{name}' must be {}, got {value}", field.field_type),
                ));
            }
        }

        let mut normalized = desired.clone();
        for field in &self.fields {
            if normalized.contains(&field.name) {
                continue;
            }
            if let Some(default) = &field.default {
                normalized.insert(field.name.clone(), default.clone());
            } else if field.required {
                return Err(Error::invalid_desired(
                    &self.kind,
                    format!("missing required field '{}'", field.name),
                ));
            }
        }

        if let Some(validate) = self.validate {
            validate(&normalized).map_err(|message| Error::invalid_desired(&self.kind, message))?;
        }

        Ok(normalized)
    }
}

/// Builder for [`ResourceSpec`]
#[derive(Debug, Clone)]
pub struct ResourceSpecBuilder {
    kind: String,
    description: String,
    fields: Vec<FieldSpec>,
    identity: Option<IdentitySource>,
    natural_key: Vec<String>,
    create: Option<WriteOp>,
    read: Option<Route>,
    read_via_list: bool,
    update: Option<WriteOp>,
    delete: Option<DeleteOp>,
    list: Option<Route>,
    importable: bool,
    compensation: Vec<CompensationStep>,
    validate: Option<ValidateFn>,
}

impl ResourceSpecBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: String::new(),
            fields: Vec::new(),
            identity: None,
            natural_key: Vec::new(),
            create: None,
            read: None,
            read_via_list: false,
            update: None,
            delete: None,
            list: None,
            importable: false,
            compensation: Vec::new(),
            validate: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn identity(mut self, source: IdentitySource) -> Self {
        self.identity = Some(source);
        self
    }

    pub fn natural_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.natural_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn create(mut self, op: WriteOp) -> Self {
        self.create = Some(op);
        self
    }

    pub fn read(mut self, route: Route) -> Self {
        self.read = Some(route);
        self
    }

    /// Fall back to a list scan when the by-id read returns an unusable body
    pub fn read_via_list(mut self) -> Self {
        self.read_via_list = true;
        self
    }

    pub fn update(mut self, op: WriteOp) -> Self {
        self.update = Some(op);
        self
    }

    pub fn delete(mut self, op: DeleteOp) -> Self {
        self.delete = Some(op);
        self
    }

    pub fn list(mut self, route: Route) -> Self {
        self.list = Some(route);
        self
    }

    pub fn importable(mut self) -> Self {
        self.importable = true;
        self
    }

    pub fn compensate(mut self, step: CompensationStep) -> Self {
        self.compensation.push(step);
        self
    }

    pub fn validate(mut self, validate: ValidateFn) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn build(self) -> Result<ResourceSpec> {
        let kind = self.kind;
        let invalid = |message: String| Error::invalid_spec(&kind, message);

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if field.computed && field.required {
                return Err(invalid(format!(
                    "computed field '{}' cannot be required",
                    field.name
                )));
            }
            if let Some(default) = &field.default
                && !field.field_type.accepts(default)
            {
                return Err(invalid(format!(
                    "default for '{}' is not a {}",
                    field.name, field.field_type
                )));
            }
        }
        let has = |name: &str| seen.contains(name);

        for field in &self.fields {
            let branch = match (&field.source, &field.wire) {
                (Source::Discriminated(b), _) | (_, Some(WireKey::Discriminated(b))) => Some(b),
                _ => None,
            };
            if let Some(branch) = branch
                && !has(branch.discriminant())
            {
                return Err(invalid(format!(
                    "field '{}' is discriminated by unknown field '{}'",
                    field.name,
                    branch.discriminant()
                )));
            }
        }

        let Some(create) = self.create else {
            return Err(invalid("a create operation is required".to_string()));
        };
        let Some(delete) = self.delete else {
            return Err(invalid("a delete operation is required".to_string()));
        };
        let identity = self
            .identity
            .unwrap_or_else(|| IdentitySource::Response("Id".to_string()));

        if self.update.is_none() {
            let mutable: Vec<&str> = self
                .fields
                .iter()
                .filter(|f| !f.computed && f.mutability == Mutability::Mutable)
                .map(|f| f.name.as_str())
                .collect();
            if !mutable.is_empty() {
                return Err(invalid(format!(
                    "fields {} are mutable but the kind has no update operation",
                    mutable.join(", ")
                )));
            }
        }

        for name in &self.natural_key {
            match self.fields.iter().find(|f| &f.name == name) {
                None => return Err(invalid(format!("natural key field '{name}' is not declared"))),
                Some(f) if f.authority() == Authority::Local => {
                    return Err(invalid(format!(
                        "natural key field '{name}' is not reported by the remote"
                    )));
                }
                Some(_) => {}
            }
        }
        if !self.natural_key.is_empty() && self.list.is_none() {
            return Err(invalid("a natural key requires a list operation".to_string()));
        }

        match &identity {
            IdentitySource::Field(name) if !has(name.as_str()) => {
                return Err(invalid(format!("identity field '{name}' is not declared")));
            }
            IdentitySource::Response(_) if self.natural_key.is_empty() => {
                log::debug!("{kind}: identity comes only from the create response");
            }
            IdentitySource::Template(template) => {
                if let Some(missing) = Route::get(template.as_str())
                    .placeholders()
                    .into_iter()
                    .find(|p| !has(p))
                {
                    return Err(invalid(format!(
                        "identity template {template} references unknown field '{missing}'"
                    )));
                }
            }
            _ => {}
        }

        if self.read_via_list && (self.list.is_none() || self.read.is_none()) {
            return Err(invalid(
                "list-scan read fallback requires read and list operations".to_string(),
            ));
        }
        if self.importable && self.read.is_none() {
            return Err(invalid("importable kinds must support read".to_string()));
        }

        let routes = [Some(&create.route), self.read.as_ref(), self.list.as_ref()]
            .into_iter()
            .flatten()
            .chain(self.update.as_ref().map(|u| &u.route))
            .chain(match &delete {
                DeleteOp::Remote(route) => Some(route),
                DeleteOp::Forget => None,
            });
        for route in routes {
            if let Some(missing) = route.placeholders().into_iter().find(|p| !has(p)) {
                return Err(invalid(format!(
                    "route {} references unknown field '{missing}'",
                    route.path
                )));
            }
        }
        for step in &self.compensation {
            if let Some((field, _)) = step
                .captures
                .iter()
                .find(|(field, _)| !self.fields.iter().any(|f| &f.name == field && f.computed))
            {
                return Err(invalid(format!(
                    "step '{}' captures '{field}', which is not a computed field",
                    step.name
                )));
            }
        }

        Ok(ResourceSpec {
            kind,
            description: self.description,
            fields: self.fields,
            identity,
            natural_key: self.natural_key,
            create,
            read: self.read,
            read_via_list: self.read_via_list,
            update: self.update,
            delete,
            list: self.list,
            importable: self.importable,
            compensation: self.compensation,
            validate: self.validate,
        })
    }
}
