//! Plugin manifest — `manifest.json` in each plugin directory

use extgate_core::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DEFAULT_ENTRY_POINT: &str = "main";
pub const DEFAULT_VERSION: &str = "0.0.0";

/// On-disk form; every field is optional and defaulted in [`Manifest::parse`].
#[derive(Deserialize, Default)]
struct RawManifest {
    plugin_id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    entry_point: Option<String>,
    enabled: Option<bool>,
}

/// Validated plugin metadata. Immutable once loaded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Manifest {
    pub plugin_id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub entry_point: String,
    pub enabled: bool,
    /// Directory the manifest was read from.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Manifest {
    /// Read and validate `<dir>/manifest.json`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let folder = folder_name(dir);
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::load(&folder, format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text, dir)
    }

    /// Parse manifest text for a plugin living in `dir`.
    pub fn parse(text: &str, dir: &Path) -> Result<Self> {
        let folder = folder_name(dir);
        let raw: RawManifest = serde_json::from_str(text)
            .map_err(|e| GatewayError::load(&folder, format!("malformed manifest: {}", e)))?;

        let plugin_id = raw
            .plugin_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| folder.clone());
        validate_id(&plugin_id).map_err(|reason| GatewayError::load(&folder, reason))?;

        Ok(Self {
            name: raw.name.unwrap_or_else(|| plugin_id.clone()),
            version: raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            description: raw.description.unwrap_or_default(),
            entry_point: raw
                .entry_point
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string()),
            enabled: raw.enabled.unwrap_or(true),
            root: dir.to_path_buf(),
            plugin_id,
        })
    }
}

/// Last path component, used as the default id and to label failures.
pub fn folder_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Ids are used as tool origins and log fields: ASCII alphanumerics plus `-`, `_`, `.`.
fn validate_id(id: &str) -> std::result::Result<(), String> {
    if id.is_empty() {
        return Err("plugin id must not be empty".into());
    }
    if id == extgate_core::CORE_ORIGIN {
        return Err(format!("plugin id '{}' is reserved", id));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(format!("invalid plugin id: {}", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_manifest() {
        let m = Manifest::parse(
            r#"{"plugin_id":"weather","name":"Weather","version":"1.2.0","description":"forecasts","entry_point":"weather_v1"}"#,
            Path::new("/plugins/wx"),
        )
        .unwrap();
        assert_eq!(m.plugin_id, "weather");
        assert_eq!(m.name, "Weather");
        assert_eq!(m.entry_point, "weather_v1");
        assert!(m.enabled);
        assert_eq!(m.root, Path::new("/plugins/wx"));
    }

    #[test]
    fn missing_fields_are_defaulted() {
        let m = Manifest::parse("{}", Path::new("/plugins/notes")).unwrap();
        assert_eq!(m.plugin_id, "notes");
        assert_eq!(m.name, "notes");
        assert_eq!(m.version, "0.0.0");
        assert_eq!(m.entry_point, "main");
        assert!(m.description.is_empty());
    }

    #[test]
    fn blank_id_falls_back_to_folder() {
        let m = Manifest::parse(r#"{"plugin_id":"  "}"#, Path::new("/p/ocr")).unwrap();
        assert_eq!(m.plugin_id, "ocr");
    }

    #[test]
    fn malformed_json_is_load_error() {
        let err = Manifest::parse("{not json", Path::new("/p/bad")).unwrap_err();
        assert_eq!(err.kind(), extgate_core::ErrorKind::Load);
        assert_eq!(err.origin(), Some("bad"));
    }

    #[test]
    fn reserved_and_invalid_ids_rejected() {
        assert!(Manifest::parse(r#"{"plugin_id":"core"}"#, Path::new("/p/x")).is_err());
        assert!(Manifest::parse(r#"{"plugin_id":"../etc"}"#, Path::new("/p/x")).is_err());
    }
}
