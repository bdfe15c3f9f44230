use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const TEMP_DIR: &str = "temp";

async fn init_workspace(workspace: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace.join(TEMP_DIR)).await?;
    Ok(())
}

/// Shared request state: the scratch directory plus a counter handing out
/// unique output paths. Cloning is cheap, all clones share the counter.
#[derive(Clone)]
pub struct AppState {
    temp_dir: PathBuf,
    sequence: Arc<AtomicU64>,
}

impl AppState {
    pub async fn new(workspace: &Path) -> anyhow::Result<Self> {
        init_workspace(workspace).await?;
        Ok(Self {
            temp_dir: workspace.join(TEMP_DIR),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.as_path()
    }

    /// A scratch path no concurrent request can collide with. The process id
    /// keeps paths distinct across restarts onto a dirty workspace.
    pub fn scratch_path(&self, extension: &str) -> PathBuf {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.temp_dir.join(format!(
            "transcode-{}-{}.{}",
            std::process::id(),
            sequence,
            extension
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scratch_paths_are_unique() {
        let workspace = std::env::temp_dir().join(format!("at-state-{}", std::process::id()));
        let state = AppState::new(&workspace).await.unwrap();
        let a = state.scratch_path("wav");
        let b = state.scratch_path("wav");
        assert_ne!(a, b);
        assert!(a.starts_with(state.temp_dir()));
        let _ = tokio::fs::remove_dir_all(&workspace).await;
    }
}
