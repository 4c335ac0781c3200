use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::paths::AppPaths;
use super::settings::RagConfig;
use super::validation::validate_config;
use crate::core::errors::RagError;

/// Environment variables recognised as overrides, applied after the YAML file.
const ENV_OVERRIDES: [&str; 8] = [
    "CHUNK_SIZE",
    "CHUNK_OVERLAP",
    "PDF_DIR",
    "VECTOR_DB_PATH",
    "EMBEDDING_MODEL",
    "EMBEDDING_BASE_URL",
    "OPENAI_MODEL",
    "OPENAI_BASE_URL",
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("PDF_RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    /// Defaults, then the YAML file, then environment overrides. Validated.
    pub fn load_config(&self) -> Result<RagConfig, RagError> {
        let mut config = load_yaml_file(&self.config_path())?;
        apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        validate_config(&config)?;
        Ok(config)
    }
}

fn load_yaml_file(path: &Path) -> Result<RagConfig, RagError> {
    if !path.exists() {
        return Ok(RagConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(RagConfig::default());
    }
    serde_yaml::from_str::<RagConfig>(&contents)
        .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))
}

pub(crate) fn apply_env_overrides<F>(config: &mut RagConfig, lookup: F) -> Result<(), RagError>
where
    F: Fn(&str) -> Option<String>,
{
    for key in ENV_OVERRIDES {
        let Some(value) = lookup(key) else {
            continue;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }

        match key {
            "CHUNK_SIZE" => config.chunk_size = parse_usize(key, &value)?,
            "CHUNK_OVERLAP" => config.chunk_overlap = parse_usize(key, &value)?,
            "PDF_DIR" => config.document_source_path = PathBuf::from(value),
            "VECTOR_DB_PATH" => config.index_store_path = PathBuf::from(value),
            "EMBEDDING_MODEL" => config.embedding_model = value,
            "EMBEDDING_BASE_URL" => config.embedding_base_url = value,
            "OPENAI_MODEL" => config.completion_model = value,
            "OPENAI_BASE_URL" => config.completion_base_url = value,
            _ => {}
        }
    }
    Ok(())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, RagError> {
    value
        .parse::<usize>()
        .map_err(|_| RagError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
