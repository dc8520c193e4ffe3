//! `backup`: a password-protected archive of the Portainer instance.
//!
//! `POST /backup` answers with the archive itself, which is written to
//! `output_path`. The path is the identity, so a backup is taken once per
//! declared path. Nothing is tracked remotely: destroy leaves the file in
//! place and only stops tracking it.

use reconcile::{
    DeleteOp, DesiredState, FieldSpec, IdentitySource, ResourceSpec, Response, Result, Route,
    WriteOp,
};
use std::path::Path;

pub fn spec() -> Result<ResourceSpec> {
    ResourceSpec::builder("backup")
        .describe("Encrypted backup archive of the Portainer instance")
        .field(
            FieldSpec::string("password")
                .required()
                .sensitive()
                .wire("password")
                .describe("Password the archive is encrypted with"),
        )
        .field(
            FieldSpec::string("output_path")
                .required()
                .describe("Local file the archive is written to"),
        )
        .identity(IdentitySource::field("output_path"))
        .create(WriteOp::new(Route::post("/backup")).after(save_archive))
        .delete(DeleteOp::Forget)
        .build()
}

fn save_archive(desired: &DesiredState, response: &Response) -> std::result::Result<(), String> {
    let Some(path) = desired.get_str("output_path") else {
        return Err("output_path is not set".to_string());
    };
    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;
    }
    std::fs::write(path, &response.bytes)
        .map_err(|e| format!("cannot write backup to {}: {e}", path.display()))?;
    log::info!("wrote {} byte backup to {}", response.bytes.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::kinds::engine;
    use reconcile::{Action, DesiredState, Error, Identity, Method, MockClient, PriorState};
    use tempfile::TempDir;

    fn backup_to(path: &std::path::Path) -> DesiredState {
        DesiredState::new()
            .with("password", "archive-pass")
            .with("output_path", path.to_string_lossy().to_string())
    }

    #[test]
    fn test_archive_written_to_output_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nightly").join("portainer.tar.gz");
        let mock = MockClient::new();
        mock.respond(Method::Post, "/backup", 200, "archive-bytes");
        let engine = engine(&mock);

        let result = engine
            .apply("backup", &backup_to(&path), &PriorState::none())
            .unwrap();
        assert_eq!(result.action, Action::Created);
        assert_eq!(result.identity, Identity::new(path.to_string_lossy()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "archive-bytes");

        let posts = mock.requests_for(Method::Post);
        assert_eq!(
            posts[0].body.as_ref().unwrap().text(),
            r#"{"password":"archive-pass"}"#
        );
    }

    #[test]
    fn test_unwritable_path_fails_the_create() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let path = blocker.join("portainer.tar.gz");
        let mock = MockClient::new();
        mock.respond(Method::Post, "/backup", 200, "archive-bytes");

        let err = engine(&mock)
            .apply("backup", &backup_to(&path), &PriorState::none())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
        assert!(err.to_string().contains("cannot"));
    }

    #[test]
    fn test_taken_once_per_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portainer.tar.gz");
        let mock = MockClient::new();
        let engine = engine(&mock);

        let desired = backup_to(&path);
        let prior = PriorState::new(Identity::new(path.to_string_lossy()), Some(desired.clone()));
        let result = engine.apply("backup", &desired, &prior).unwrap();
        assert_eq!(result.action, Action::Unchanged);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_destroy_keeps_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("portainer.tar.gz");
        std::fs::write(&path, "archive-bytes").unwrap();
        let mock = MockClient::new();

        let result = engine(&mock)
            .destroy("backup", &Identity::new(path.to_string_lossy()), &backup_to(&path))
            .unwrap();
        assert_eq!(result.action, Action::Forgotten);
        assert!(path.exists());
        assert!(mock.requests().is_empty());
    }
}
