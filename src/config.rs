//! Pipetting configuration.
//!
//! Pipetting methods and the role defaults are read from TOML:
//!
//! ```toml
//! [defaults]
//! sector = "CyBio"
//! non_sector = "BioMek"
//! stock = "BioMekStock"
//!
//! [[methods]]
//! name = "CyBio"
//! min_transfer_volume = 1.0   # µl
//! max_transfer_volume = 50.0  # µl
//! max_dilution_factor = 10.0  # default
//! sector_bound = true
//! ```
//!
//! Parsing validates that method names are unique, that every default
//! names a configured method and that min ≤ max.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::error::PlanningError;
use crate::models::{DefaultMethods, PipettingSpecs, PipettingSpecsRegistry};

/// Errors that can occur while loading a pipetting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("duplicate pipetting method: {0:?}")]
    DuplicateMethod(String),

    #[error("default {role} method {name:?} is not configured")]
    UnknownDefault { role: &'static str, name: String },

    #[error("method {name:?}: minimum transfer volume {min} µl exceeds maximum {max} µl")]
    InvalidVolumeRange { name: String, min: f64, max: f64 },

    #[error("method {0:?}: transfer volumes must be positive")]
    NonPositiveVolume(String),

    #[error("invalid pipetting registry: {0}")]
    Registry(#[from] PlanningError),
}

fn default_dilution_factor() -> f64 {
    10.0
}

/// One configured pipetting method. Volumes in µl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub name: String,
    pub min_transfer_volume: f64,
    pub max_transfer_volume: f64,
    #[serde(default = "default_dilution_factor")]
    pub max_dilution_factor: f64,
    #[serde(default)]
    pub sector_bound: bool,
}

impl MethodConfig {
    fn to_specs(&self) -> PipettingSpecs {
        let mut specs = PipettingSpecs::new(&self.name, self.min_transfer_volume, self.max_transfer_volume)
            .with_max_dilution_factor(self.max_dilution_factor);
        if self.sector_bound {
            specs = specs.sector_bound();
        }
        specs
    }
}

/// Pipetting methods plus role defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipettingConfig {
    pub defaults: DefaultMethods,
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
}

impl PipettingConfig {
    /// Parses and validates a TOML configuration.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in lab setup.
    pub fn standard() -> Self {
        let method = |name: &str, min: f64, max: f64, sector: bool| MethodConfig {
            name: name.to_string(),
            min_transfer_volume: min,
            max_transfer_volume: max,
            max_dilution_factor: default_dilution_factor(),
            sector_bound: sector,
        };
        Self {
            defaults: DefaultMethods {
                sector: "CyBio".to_string(),
                non_sector: "BioMek".to_string(),
                stock: "BioMekStock".to_string(),
            },
            methods: vec![
                method("BioMek", 1.0, 250.0, false),
                method("CyBio", 1.0, 50.0, true),
                method("BioMekStock", 1.0, 250.0, false),
                method("Manual", 0.5, 500.0, false),
            ],
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for m in &self.methods {
            if !seen.insert(m.name.as_str()) {
                return Err(ConfigError::DuplicateMethod(m.name.clone()));
            }
            if m.min_transfer_volume <= 0.0 || m.max_transfer_volume <= 0.0 {
                return Err(ConfigError::NonPositiveVolume(m.name.clone()));
            }
            if m.min_transfer_volume > m.max_transfer_volume {
                return Err(ConfigError::InvalidVolumeRange {
                    name: m.name.clone(),
                    min: m.min_transfer_volume,
                    max: m.max_transfer_volume,
                });
            }
        }
        for (role, name) in [
            ("sector", &self.defaults.sector),
            ("non-sector", &self.defaults.non_sector),
            ("stock", &self.defaults.stock),
        ] {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::UnknownDefault {
                    role,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Builds the method registry.
    pub fn registry(&self) -> Result<PipettingSpecsRegistry, ConfigError> {
        self.validate()?;
        let specs = self.methods.iter().map(MethodConfig::to_specs).collect();
        Ok(PipettingSpecsRegistry::new(specs, self.defaults.clone())?)
    }
}
