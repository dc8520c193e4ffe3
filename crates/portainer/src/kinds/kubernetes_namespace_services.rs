//! `kubernetes_namespace_services`: a Kubernetes Service in one namespace.
//!
//! Create and update send the whole service to the same collection path,
//! as `POST` and `PUT`. Portainer has no per-service read, so state echoes
//! the last apply. The identity is `<environment_id>:<namespace>:<name>`.
//!
//! Ports are declared as tables:
//!
//! ```toml
//! ports = [{ name = "http", port = 80, target_port = 8080 }]
//! ```
//!
//! `protocol` defaults to `TCP`. `target_port` is a number or a named
//! container port and is always sent as a string.

use reconcile::{
    DeleteOp, DesiredState, FieldSpec, IdentitySource, Payload, PayloadBuilder, ResourceSpec,
    Result, Route, WriteOp, json_payload,
};
use serde_json::{Map, Value, json};

const SERVICES: &str = "/kubernetes/{environment_id}/namespaces/{namespace}/services";

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("kubernetes_namespace_services")
        .describe("Kubernetes Service inside a namespace of a Portainer environment")
        .field(FieldSpec::int("environment_id").required())
        .field(FieldSpec::string("namespace").required().wire("namespace"))
        .field(FieldSpec::string("name").required().wire("name"))
        .field(
            FieldSpec::string("type")
                .default("ClusterIP")
                .mutable()
                .wire("type")
                .describe("ClusterIP, NodePort, LoadBalancer or ExternalName"),
        )
        .field(
            FieldSpec::bool("allocate_load_balancer_node_ports")
                .default(false)
                .mutable()
                .wire("allocateLoadBalancerNodePorts"),
        )
        .field(
            FieldSpec::string_list("external_ips")
                .mutable()
                .wire("externalIPs"),
        )
        .field(FieldSpec::string("external_name").mutable().wire("externalName"))
        .field(
            FieldSpec::string("load_balancer_ip")
                .mutable()
                .wire("loadBalancerIP"),
        )
        .field(
            FieldSpec::string("session_affinity")
                .default("None")
                .mutable()
                .wire("sessionAffinity"),
        )
        .field(FieldSpec::object_list("ports").mutable())
        .field(FieldSpec::string_map("selector").mutable().wire("selector"))
        .field(FieldSpec::string_map("annotations").mutable().wire("annotations"))
        .field(FieldSpec::string_map("labels").mutable().wire("labels"))
        .identity(IdentitySource::template("{environment_id}:{namespace}:{name}"))
        .create(WriteOp::with_payload(
            Route::post(SERVICES),
            PayloadBuilder::Custom(payload),
        ))
        .update(WriteOp::with_payload(
            Route::put(SERVICES),
            PayloadBuilder::Custom(payload),
        ))
        .delete(DeleteOp::Forget)
        .validate(validate)
        .build()
}

fn validate(desired: &DesiredState) -> std::result::Result<(), String> {
    let Some(Value::Array(ports)) = desired.get("ports") else {
        return Ok(());
    };
    for (index, port) in ports.iter().enumerate() {
        service_port(port).map_err(|message| format!("ports[{index}]: {message}"))?;
    }
    Ok(())
}

/// One declared port in the shape Portainer expects
fn service_port(port: &Value) -> std::result::Result<Value, String> {
    let number = port
        .get("port")
        .and_then(Value::as_i64)
        .ok_or("port must be an integer")?;
    let target = match port.get("target_port") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err("target_port must be a number or a port name".to_string()),
    };
    let protocol = port.get("protocol").and_then(Value::as_str).unwrap_or("TCP");
    let name = port.get("name").and_then(Value::as_str).unwrap_or_default();
    Ok(json!({
        "Name": name,
        "Port": number,
        "Protocol": protocol,
        "TargetPort": target,
    }))
}

/// Whole-service body; collections are always present, empty when undeclared
fn payload(spec: &ResourceSpec, desired: &DesiredState) -> std::result::Result<Payload, String> {
    let Value::Object(mut body) = json_payload(spec, desired, |_| true) else {
        return Err("service payload is not an object".to_string());
    };

    let ports = match desired.get("ports") {
        Some(Value::Array(ports)) => ports
            .iter()
            .map(service_port)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };
    body.insert("ports".to_string(), Value::Array(ports));
    for key in ["selector", "annotations", "labels"] {
        body.entry(key).or_insert_with(|| Value::Object(Map::new()));
    }
    body.entry("externalIPs").or_insert_with(|| Value::Array(Vec::new()));
    for key in ["externalName", "loadBalancerIP"] {
        body.entry(key).or_insert_with(|| Value::String(String::new()));
    }

    Ok(Payload::Json(Value::Object(body)))
}
