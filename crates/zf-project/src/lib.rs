//! zf-project: installation file format and validation.

pub mod schema;
pub mod validate;

pub use schema::*;
pub use validate::{ValidationError, validate_installation};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn parse_yaml(content: &str) -> ProjectResult<InstallationDef> {
    let installation: InstallationDef = serde_yaml::from_str(content)?;
    validate_installation(&installation)?;
    Ok(installation)
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<InstallationDef> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content)
}

pub fn save_yaml(path: &std::path::Path, installation: &InstallationDef) -> ProjectResult<()> {
    validate_installation(installation)?;
    let content = serde_yaml::to_string(installation)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load a JSON object of key id -> PEM, as used for operator keyrings.
pub fn load_key_map(
    path: &std::path::Path,
) -> ProjectResult<std::collections::BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
