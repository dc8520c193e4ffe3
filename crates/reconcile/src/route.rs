//! Routes and payloads
//!
//! A [`Route`] is a method plus a path template. `{id}` expands to the
//! resource identity; any other `{name}` expands to the value of field `name`
//! in the instance's state. Payloads are built from the field table unless a
//! kind supplies its own builder.

use crate::client::{Body, Method};
use crate::spec::{FieldSpec, Mutability, ResourceSpec};
use crate::types::{DesiredState, Identity};
use serde_json::{Map, Value};

/// Query parameter appended to a rendered route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    /// `name=true`, present only when the boolean field is true
    Flag { name: String, field: String },
    /// `name=<value of field>`, omitted when the field is unset
    Field { name: String, field: String },
}

/// HTTP method and path template for one remote operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub query: Vec<QueryParam>,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn flag(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.query.push(QueryParam::Flag {
            name: name.into(),
            field: field.into(),
        });
        self
    }

    pub fn query_field(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.query.push(QueryParam::Field {
            name: name.into(),
            field: field.into(),
        });
        self
    }

    /// Field names referenced by `{placeholders}` in the path, excluding `{id}`
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            let name = &rest[start + 1..start + len];
            if name != "id" {
                names.push(name);
            }
            rest = &rest[start + len + 1..];
        }
        names
    }

    /// Expand the template into a concrete path with query string
    pub fn render(&self, identity: Option<&Identity>, state: &DesiredState) -> Result<String, String> {
        let mut path = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();

        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                return Err(format!("unterminated placeholder in {}", self.path));
            };
            path.push_str(&rest[..start]);
            let name = &rest[start + 1..start + len];
            let value = if name == "id" {
                match identity {
                    Some(id) if !id.is_empty() => id.as_str().to_string(),
                    _ => return Err(format!("{} requires an identity", self.path)),
                }
            } else {
                state
                    .get(name)
                    .and_then(scalar)
                    .ok_or_else(|| format!("{} requires field '{name}'", self.path))?
            };
            path.push_str(&encode(&value));
            rest = &rest[start + len + 1..];
        }
        path.push_str(rest);

        let mut pairs = Vec::new();
        for param in &self.query {
            match param {
                QueryParam::Flag { name, field } => {
                    if state.get_bool(field) == Some(true) {
                        pairs.push(format!("{name}=true"));
                    }
                }
                QueryParam::Field { name, field } => {
                    if let Some(value) = state.get(field).and_then(scalar) {
                        pairs.push(format!("{name}={}", encode(&value)));
                    }
                }
            }
        }
        if !pairs.is_empty() {
            path.push('?');
            path.push_str(&pairs.join("&"));
        }

        Ok(path)
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Percent-encode everything outside the unreserved set
fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Request payload produced for a write operation
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// Pre-encoded body (multipart forms and the like)
    Raw(Body),
    Empty,
}

impl Payload {
    pub fn into_body(self) -> Option<Body> {
        match self {
            Self::Json(value) => Some(Body::json(&value)),
            Self::Raw(body) => Some(body),
            Self::Empty => None,
        }
    }
}

/// Kind-specific payload builder
pub type PayloadFn = fn(&ResourceSpec, &DesiredState) -> Result<Payload, String>;

/// How the body of a create or update request is produced
#[derive(Debug, Clone, Copy)]
pub enum PayloadBuilder {
    /// Every writable field with a payload key
    AllFields,
    /// Only mutable fields with a payload key
    MutableFields,
    /// No body
    Empty,
    Custom(PayloadFn),
}

impl PayloadBuilder {
    pub fn build(&self, spec: &ResourceSpec, state: &DesiredState) -> Result<Payload, String> {
        match self {
            Self::AllFields => Ok(Payload::Json(json_payload(spec, state, |_| true))),
            Self::MutableFields => Ok(Payload::Json(json_payload(spec, state, |f| {
                f.mutability == Mutability::Mutable
            }))),
            Self::Empty => Ok(Payload::Empty),
            Self::Custom(build) => build(spec, state),
        }
    }
}

/// Build a JSON object from the field table
///
/// Each selected field that has a payload key and a value is written under
/// that key. Discriminated keys are chosen from the discriminant's desired
/// value, the same selection the drift reader uses on the way back.
pub fn json_payload<F>(spec: &ResourceSpec, state: &DesiredState, include: F) -> Value
where
    F: Fn(&FieldSpec) -> bool,
{
    let mut body = Map::new();
    for field in spec.fields() {
        if field.computed || !include(field) {
            continue;
        }
        let Some(value) = state.get(&field.name) else {
            continue;
        };
        if let Some(key) = field.write_key(state) {
            set_path(&mut body, key, value.clone());
        }
    }
    Value::Object(body)
}

/// Look up a dotted path (`gitlab.InstanceURL`) in a JSON value
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
        .filter(|v| !v.is_null())
}

/// Write a value at a dotted path, creating intermediate objects
pub fn set_path(object: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, tail)) => {
            let entry = object
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, tail, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_identity() {
        let route = Route::get("/teams/{id}");
        let path = route
            .render(Some(&Identity::new("7")), &DesiredState::new())
            .unwrap();
        assert_eq!(path, "/teams/7");
    }

    #[test]
    fn test_render_requires_identity() {
        let route = Route::delete("/teams/{id}");
        assert!(route.render(None, &DesiredState::new()).is_err());
        assert!(route.render(Some(&Identity::empty()), &DesiredState::new()).is_err());
    }

    #[test]
    fn test_render_field_placeholder() {
        let route = Route::delete("/endpoints/{endpoint_id}/docker/networks/{id}");
        let state = DesiredState::new().with("endpoint_id", 3);
        let path = route.render(Some(&Identity::new("abc")), &state).unwrap();
        assert_eq!(path, "/endpoints/3/docker/networks/abc");
        assert_eq!(route.placeholders(), vec!["endpoint_id"]);
    }

    #[test]
    fn test_render_missing_field() {
        let route = Route::post("/endpoints/{endpoint_id}/docker/networks/create");
        let err = route.render(None, &DesiredState::new()).unwrap_err();
        assert!(err.contains("endpoint_id"));
    }

    #[test]
    fn test_render_flag_query() {
        let route = Route::post("/licenses/add").flag("force", "force");
        let forced = DesiredState::new().with("force", true);
        assert_eq!(
            route.render(None, &forced).unwrap(),
            "/licenses/add?force=true"
        );
        let plain = DesiredState::new().with("force", false);
        assert_eq!(route.render(None, &plain).unwrap(), "/licenses/add");
    }

    #[test]
    fn test_render_encodes_values() {
        let route = Route::get("/search").query_field("q", "term");
        let state = DesiredState::new().with("term", "a b/c");
        assert_eq!(route.render(None, &state).unwrap(), "/search?q=a%20b%2Fc");
    }

    #[test]
    fn test_get_path_nested() {
        let value = json!({"gitlab": {"InstanceURL": "https://gitlab.com"}, "Empty": null});
        assert_eq!(
            get_path(&value, "gitlab.InstanceURL"),
            Some(&json!("https://gitlab.com"))
        );
        assert_eq!(get_path(&value, "gitlab.Missing"), None);
        assert_eq!(get_path(&value, "Empty"), None);
    }

    #[test]
    fn test_set_path_nested() {
        let mut object = Map::new();
        set_path(&mut object, "ecr.Region", json!("eu-west-1"));
        set_path(&mut object, "Name", json!("ecr"));
        assert_eq!(
            Value::Object(object),
            json!({"ecr": {"Region": "eu-west-1"}, "Name": "ecr"})
        );
    }
}
