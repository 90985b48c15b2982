//! Workspace lifecycle: create before analysis, remove after.

use tokio::fs;
use tracing::warn;

use medrisk_core::Result;
use medrisk_core::request::AnalysisRequest;
use medrisk_core::workspace::Workspace;

/// Create the workspace directory tree and write the request payload into
/// it, ready for the analyzer.
pub(crate) async fn prepare(workspace: &Workspace, request: &AnalysisRequest) -> Result<()> {
    fs::create_dir_all(workspace.results_dir()).await?;
    let payload = serde_json::to_vec_pretty(request.as_value())?;
    fs::write(workspace.input_path(), payload).await?;
    Ok(())
}

/// Best-effort removal. Failures are logged and swallowed: cleanup must
/// never change a job's outcome.
pub(crate) async fn remove(workspace: &Workspace) {
    if let Err(e) = fs::remove_dir_all(workspace.dir()).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %workspace.dir().display(), error = %e, "Failed to remove workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrisk_core::JobId;
    use serde_json::json;

    fn make_request() -> AnalysisRequest {
        AnalysisRequest::from_value(json!({"medications": ["clopidogrel"]})).unwrap()
    }

    #[tokio::test]
    async fn test_prepare_lays_out_workspace() {
        let root = tempfile::tempdir().unwrap();
        let id = JobId::new();
        let workspace = Workspace::new(root.path(), id);

        prepare(&workspace, &make_request()).await.unwrap();

        assert!(workspace.dir().is_dir());
        assert!(workspace.results_dir().is_dir());
        let written = std::fs::read(workspace.input_path()).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&written).unwrap();
        assert_eq!(payload["medications"][0], "clopidogrel");
        assert!(
            workspace
                .dir()
                .to_string_lossy()
                .contains(&id.to_string())
        );
    }

    #[tokio::test]
    async fn test_remove_deletes_everything() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path(), JobId::new());
        prepare(&workspace, &make_request()).await.unwrap();
        std::fs::write(workspace.results_dir().join("scratch.json"), b"{}").unwrap();

        remove(&workspace).await;
        assert!(!workspace.dir().exists());
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(root.path(), JobId::new());
        // Never created; removal is a no-op.
        remove(&workspace).await;
        assert!(!workspace.dir().exists());
    }
}
