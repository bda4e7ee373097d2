//! Run configuration.
//!
//! Loaded from JSON; every field has a default, so `{}` is a valid
//! configuration that processes `database/` into `database_final/`.

use crate::error::{EtlError, Result, ResultExt as _};
use crate::locality::{DIMENSION_FILE, JoinKeys, KeyWidth};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a table contributes to the run besides being cleaned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRole {
    /// Feeds localities into the dimension and is enriched on city + state.
    Source,
    /// Enriched on city + state; never adds localities.
    JoinCityState,
    /// Enriched on state only.
    JoinState,
    /// Cleaned and written without keys.
    #[default]
    Passthrough,
}

impl TableRole {
    pub fn contributes_localities(self) -> bool {
        self == Self::Source
    }

    pub fn join_keys(self) -> Option<JoinKeys> {
        match self {
            Self::Source | Self::JoinCityState => Some(JoinKeys::CityState),
            Self::JoinState => Some(JoinKeys::State),
            Self::Passthrough => None,
        }
    }
}

/// Role assignment for one input file, matched on file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRule {
    pub file: String,
    pub role: TableRole,
}

impl TableRule {
    pub fn new(file: impl Into<String>, role: TableRole) -> Self {
        Self {
            file: file.into(),
            role,
        }
    }
}

/// Whether a run extends the persisted dimension or replaces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionMode {
    #[default]
    Merge,
    /// Discards the persisted dimension; issued keys may change.
    Rebuild,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Defaults to `<output_dir>/dim_localidade.csv` when unset.
    pub dimension_path: Option<PathBuf>,
    pub city_key_width: usize,
    pub dimension_mode: DimensionMode,
    pub tables: Vec<TableRule>,
    /// Columns cleaned as person names.
    pub name_columns: Vec<String>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("database"),
            output_dir: PathBuf::from("database_final"),
            log_dir: PathBuf::from("logs"),
            dimension_path: None,
            city_key_width: KeyWidth::DEFAULT_CITY.digits(),
            dimension_mode: DimensionMode::Merge,
            tables: vec![
                TableRule::new("clientes.csv", TableRole::Source),
                TableRule::new("ocorrencias_tecnicas.csv", TableRole::JoinCityState),
                TableRule::new("perdas_energia.csv", TableRole::JoinState),
            ],
            name_columns: vec!["nome_cliente".to_owned()],
        }
    }
}

impl EtlConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.city_width()?;
        for (name, path) in [
            ("input_dir", &self.input_dir),
            ("output_dir", &self.output_dir),
            ("log_dir", &self.log_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(EtlError::Config(format!("{name} must not be empty")));
            }
        }
        if let Some(rule) = self.tables.iter().find(|rule| rule.file.trim().is_empty()) {
            return Err(EtlError::Config(format!(
                "table rule with role {:?} has no file name",
                rule.role
            )));
        }
        Ok(())
    }

    pub fn city_width(&self) -> Result<KeyWidth> {
        KeyWidth::new(self.city_key_width)
    }

    pub fn dimension_path(&self) -> PathBuf {
        self.dimension_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(DIMENSION_FILE))
    }

    /// Role of an input file; files without a rule are passed through.
    pub fn role_for(&self, file_name: &str) -> TableRole {
        self.tables
            .iter()
            .find(|rule| rule.file.eq_ignore_ascii_case(file_name))
            .map(|rule| rule.role)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_empty_json_uses_defaults() -> Result<()> {
        let config = EtlConfig::from_json("{}")?;
        assert_eq!(config, EtlConfig::default());
        assert_eq!(
            config.dimension_path(),
            PathBuf::from("database_final").join("dim_localidade.csv")
        );
        assert_eq!(config.city_width()?, KeyWidth::DEFAULT_CITY);
        Ok(())
    }

    #[test]
    fn test_roles() -> Result<()> {
        let config = EtlConfig::from_json(
            r#"{ "tables": [ { "file": "clientes.csv", "role": "source" },
                             { "file": "perdas_energia.csv", "role": "join_state" } ] }"#,
        )?;
        assert_eq!(config.role_for("CLIENTES.csv"), TableRole::Source);
        assert_eq!(config.role_for("perdas_energia.csv"), TableRole::JoinState);
        assert_eq!(config.role_for("medicoes.csv"), TableRole::Passthrough);
        assert!(TableRole::Source.contributes_localities());
        assert!(!TableRole::JoinCityState.contributes_localities());
        assert_eq!(TableRole::Passthrough.join_keys(), None);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_width() -> Result<()> {
        let config = EtlConfig::from_json(r#"{ "city_key_width": 12 }"#)?;
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_file_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("etl.json");
        let config = EtlConfig {
            dimension_mode: DimensionMode::Rebuild,
            city_key_width: 5,
            ..EtlConfig::default()
        };
        config.to_file(&path)?;
        assert_eq!(EtlConfig::from_file(&path)?, config);
        Ok(())
    }
}
