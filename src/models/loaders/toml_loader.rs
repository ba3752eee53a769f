use crate::error::{AppResult, ConfigError};
use crate::models::vocabulary::Vocabulary;
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载词表
///
/// 文件格式：
/// ```toml
/// software = ["GROMACS", "AMBER"]
/// explicit_water_models = ["TIP3P"]
/// ions = ["NaCl"]
/// ```
pub async fn load_vocabulary(toml_file_path: &Path) -> AppResult<Vocabulary> {
    let path_display = toml_file_path.display().to_string();
    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|source| ConfigError::FileRead {
            path: path_display.clone(),
            source,
        })?;

    let vocabulary: Vocabulary = toml::from_str(&content).map_err(|source| {
        ConfigError::TomlParseFailed {
            path: path_display.clone(),
            source,
        }
    })?;

    let vocabulary = vocabulary.normalized();
    tracing::info!(
        "词表加载完成: {} (软件 {} / 力场 {} / 离子 {})",
        path_display,
        vocabulary.software.len(),
        vocabulary.force_fields.len(),
        vocabulary.ions.len()
    );

    Ok(vocabulary)
}

/// 有文件时从文件加载，否则使用内置词表
pub async fn load_vocabulary_or_builtin(path: Option<&Path>) -> AppResult<Vocabulary> {
    match path {
        Some(path) => load_vocabulary(path).await,
        None => Ok(Vocabulary::builtin().normalized()),
    }
}
