//! Minimal `multipart/form-data` encoder.
//!
//! Only text parts are needed: Portainer's environment endpoint takes its
//! settings as form fields.

use reconcile::Body;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A form made of text fields, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    parts: Vec<(String, String)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Boundary derived from the form contents, retried until no value contains it
    fn boundary(&self) -> String {
        let mut salt = 0u64;
        loop {
            let mut hasher = DefaultHasher::new();
            self.parts.hash(&mut hasher);
            salt.hash(&mut hasher);
            let boundary = format!("dockhand-{:016x}", hasher.finish());
            if !self
                .parts
                .iter()
                .any(|(name, value)| name.contains(&boundary) || value.contains(&boundary))
            {
                return boundary;
            }
            salt += 1;
        }
    }

    pub fn into_body(self) -> Body {
        let boundary = self.boundary();
        let mut out = String::new();
        for (name, value) in &self.parts {
            out.push_str(&format!("--{boundary}\r\n"));
            out.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                escape(name)
            ));
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{boundary}--\r\n"));

        Body {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            bytes: out.into_bytes(),
        }
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_fields_in_order() {
        let body = Form::new()
            .text("Name", "local")
            .text("EndpointCreationType", "1")
            .into_body();
        let boundary = body
            .content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap()
            .to_string();
        let text = body.text();

        let expected = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"Name\"\r\n\r\nlocal\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"EndpointCreationType\"\r\n\r\n1\r\n\
             --{boundary}--\r\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_boundary_is_stable() {
        let a = Form::new().text("Name", "local").into_body();
        let b = Form::new().text("Name", "local").into_body();
        assert_eq!(a.content_type, b.content_type);
    }

    #[test]
    fn test_quotes_in_names_are_escaped() {
        let body = Form::new().text("a\"b", "v").into_body();
        assert!(body.text().contains(r#"name="a\"b""#));
    }
}
