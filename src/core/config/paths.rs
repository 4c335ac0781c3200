use std::env;
use std::fs;
use std::path::PathBuf;

/// Where the CLI looks for `config.yml` and writes its logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Working directory, or `PDF_RAG_ROOT`
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = env::var_os("PDF_RAG_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let user_data_dir = resolve_data_dir(|key| env::var(key).ok());

        let paths = Self::from_dirs(project_root, user_data_dir);
        let _ = fs::create_dir_all(&paths.log_dir);
        paths
    }

    /// Everything under one directory; nothing is created on disk.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::from_dirs(root.clone(), root)
    }

    fn from_dirs(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        Self {
            project_root,
            user_data_dir,
            log_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// `PDF_RAG_DATA_DIR`, else `$XDG_DATA_HOME/pdf-rag`, else `~/.local/share/pdf-rag`.
fn resolve_data_dir<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = set("PDF_RAG_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let base = set("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| set("HOME").map(|home| PathBuf::from(home).join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("pdf-rag")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(vars: &[(&str, &str)]) -> PathBuf {
        let env: HashMap<&str, &str> = vars.iter().copied().collect();
        resolve_data_dir(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn explicit_data_dir_wins() {
        let dir = resolve(&[
            ("PDF_RAG_DATA_DIR", "/srv/rag"),
            ("XDG_DATA_HOME", "/xdg"),
            ("HOME", "/home/ana"),
        ]);
        assert_eq!(dir, PathBuf::from("/srv/rag"));
    }

    #[test]
    fn xdg_then_home_fallbacks() {
        assert_eq!(
            resolve(&[("XDG_DATA_HOME", "/xdg"), ("HOME", "/home/ana")]),
            PathBuf::from("/xdg/pdf-rag")
        );
        assert_eq!(
            resolve(&[("XDG_DATA_HOME", " "), ("HOME", "/home/ana")]),
            PathBuf::from("/home/ana/.local/share/pdf-rag")
        );
        assert_eq!(resolve(&[]), PathBuf::from("./pdf-rag"));
    }

    #[test]
    fn rooted_paths_keep_logs_under_the_root() {
        let paths = AppPaths::with_root("/tmp/rag");
        assert_eq!(paths.project_root, PathBuf::from("/tmp/rag"));
        assert_eq!(paths.user_data_dir, PathBuf::from("/tmp/rag"));
        assert_eq!(paths.log_dir, PathBuf::from("/tmp/rag/logs"));
    }
}
