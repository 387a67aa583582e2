use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::outliers::DEFAULT_IQR_MULTIPLIER;
use crate::store::PanelView;

/// FRED-MD vintages whose first data row carries transformation codes.
pub const DEFAULT_RECOGNIZED_FORMATS: [&str; 2] = ["2015-07.csv", "2024-02.csv"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("The outlier multiplier must be finite and positive, got {0}.")]
    InvalidMultiplier(f64),
}

/// Settings for one run of the preparation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source tag, usually the vintage's file name.
    pub name: String,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub dependent: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default = "default_view")]
    pub view: PanelView,
    #[serde(default = "default_true")]
    pub remove_outliers: bool,
    #[serde(default = "default_true")]
    pub impute: bool,
    #[serde(default = "default_multiplier")]
    pub outlier_multiplier: f64,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_recognized_formats")]
    pub recognized_formats: Vec<String>,
}

fn default_view() -> PanelView {
    PanelView::Derived
}

fn default_true() -> bool {
    true
}

fn default_multiplier() -> f64 {
    DEFAULT_IQR_MULTIPLIER
}

pub fn default_recognized_formats() -> Vec<String> {
    DEFAULT_RECOGNIZED_FORMATS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl PipelineConfig {
    pub fn new(name: &str, begin: NaiveDate, end: NaiveDate, dependent: &str) -> Self {
        Self {
            name: name.to_string(),
            begin,
            end,
            dependent: dependent.to_string(),
            columns: None,
            view: default_view(),
            remove_outliers: true,
            impute: true,
            outlier_multiplier: DEFAULT_IQR_MULTIPLIER,
            top_k: None,
            recognized_formats: default_recognized_formats(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.outlier_multiplier()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// The validated IQR multiplier.
    pub fn outlier_multiplier(&self) -> Result<f64, ConfigError> {
        let m = self.outlier_multiplier;
        if m.is_finite() && m > 0.0 {
            Ok(m)
        } else {
            Err(ConfigError::InvalidMultiplier(m))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let text = r#"
            name = "2024-02.csv"
            begin = "1960-01-01"
            end = "2000-01-01"
            dependent = "INDPRO"
        "#;
        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.begin, NaiveDate::from_ymd_opt(1960, 1, 1).unwrap());
        assert_eq!(config.view, PanelView::Derived);
        assert!(config.remove_outliers && config.impute);
        assert_eq!(config.outlier_multiplier, DEFAULT_IQR_MULTIPLIER);
        assert_eq!(config.recognized_formats, default_recognized_formats());
        assert!(config.columns.is_none() && config.top_k.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = PipelineConfig::new(
            "2015-07.csv",
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(1990, 6, 1).unwrap(),
            "UNRATE",
        );
        config.view = PanelView::Original;
        config.columns = Some(vec!["RPI".into(), "CPIAUCSL".into()]);
        config.top_k = Some(8);

        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        let loaded = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_rejects_bad_multiplier() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name = \"x\"\nbegin = \"1960-01-01\"\nend = \"1961-01-01\"\ndependent = \"Y\"\noutlier_multiplier = -2.0"
        )
        .unwrap();
        match PipelineConfig::load(file.path()) {
            Err(ConfigError::InvalidMultiplier(m)) => assert_eq!(m, -2.0),
            other => panic!("Expected InvalidMultiplier, got {other:?}"),
        }
    }
}
