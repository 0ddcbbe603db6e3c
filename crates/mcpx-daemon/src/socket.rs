#[cfg(not(unix))]
compile_error!("the mcpx daemon requires Unix domain sockets");

use std::path::Path;

use mcpx_core::{McpxError, Result};
use tokio::net::UnixListener;

/// Bind the daemon socket, creating the parent directory (0700) and
/// removing any stale socket file first. Liveness is the caller's
/// concern: a file alone does not imply a running daemon.
pub(crate) async fn bind_listener(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        let parent_existed = parent.exists();
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| McpxError::SocketBind {
                path: socket_path.to_path_buf(),
                source,
            })?;
        if !parent_existed {
            set_permissions(parent, 0o700).await?;
        }
    }

    if socket_path.exists() {
        tokio::fs::remove_file(socket_path)
            .await
            .map_err(|source| McpxError::SocketBind {
                path: socket_path.to_path_buf(),
                source,
            })?;
    }

    let listener = UnixListener::bind(socket_path).map_err(|source| McpxError::SocketBind {
        path: socket_path.to_path_buf(),
        source,
    })?;
    set_permissions(socket_path, 0o600).await?;
    Ok(listener)
}

pub(crate) async fn cleanup_socket_file(socket_path: &Path) {
    if socket_path.exists()
        && let Err(error) = tokio::fs::remove_file(socket_path).await
    {
        tracing::debug!(
            path = %socket_path.display(),
            error = %error,
            "failed to remove daemon socket file"
        );
    }
}

async fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|source| McpxError::SocketBind {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    #[tokio::test]
    async fn bind_removes_stale_socket_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let socket_path = dir.path().join("daemon.sock");

        {
            let _listener = super::bind_listener(&socket_path).await?;
            assert!(socket_path.exists());
        }
        // Listener dropped; the socket file is now stale.
        assert!(socket_path.exists());

        let _listener = super::bind_listener(&socket_path).await?;
        assert!(socket_path.exists());

        super::cleanup_socket_file(&socket_path).await;
        assert!(!socket_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn bind_sets_restrictive_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let socket_path = dir.path().join("private").join("daemon.sock");
        let _listener = super::bind_listener(&socket_path).await?;

        let socket_mode = std::fs::metadata(&socket_path)?.permissions().mode() & 0o777;
        let parent = socket_path.parent().expect("socket parent");
        let parent_mode = std::fs::metadata(parent)?.permissions().mode() & 0o777;

        assert_eq!(socket_mode, 0o600);
        assert_eq!(parent_mode, 0o700);
        Ok(())
    }

    #[tokio::test]
    async fn bind_does_not_chmod_existing_parent_directory() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let shared_parent = dir.path().join("shared");
        std::fs::create_dir(&shared_parent)?;
        std::fs::set_permissions(&shared_parent, std::fs::Permissions::from_mode(0o755))?;

        let socket_path = shared_parent.join("daemon.sock");
        let _listener = super::bind_listener(&socket_path).await?;

        let parent_mode = std::fs::metadata(&shared_parent)?.permissions().mode() & 0o777;
        assert_eq!(parent_mode, 0o755);
        Ok(())
    }
}
