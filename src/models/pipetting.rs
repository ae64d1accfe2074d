//! Pipetting methods (robot specs) and reservoirs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::volume::ul_to_liters;
use crate::error::PlanningError;

/// Properties of a pipetting method or robot.
///
/// Volumes are stored in liters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipettingSpecs {
    /// Method or robot name (e.g., "BioMek", "CyBio").
    pub name: String,
    /// Smallest volume the method can pipette (l).
    pub min_transfer_volume: f64,
    /// Largest volume the method can pipette (l).
    pub max_transfer_volume: f64,
    /// Largest dilution of a sample by one transfer into a filled container.
    pub max_dilution_factor: f64,
    /// Whether the robot pipettes whole rack sectors at once.
    pub is_sector_bound: bool,
}

impl PipettingSpecs {
    /// Creates specs from microliter volumes.
    pub fn new(name: impl Into<String>, min_ul: f64, max_ul: f64) -> Self {
        Self {
            name: name.into(),
            min_transfer_volume: ul_to_liters(min_ul),
            max_transfer_volume: ul_to_liters(max_ul),
            max_dilution_factor: 10.0,
            is_sector_bound: false,
        }
    }

    pub fn with_max_dilution_factor(mut self, factor: f64) -> Self {
        self.max_dilution_factor = factor;
        self
    }

    pub fn sector_bound(mut self) -> Self {
        self.is_sector_bound = true;
        self
    }
}

/// An anonymous source rack for dilutions (buffer trough).
///
/// Reservoirs are not tracked volume-wise; they count as unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirSpecs {
    pub name: String,
    pub description: String,
    /// Maximum volume per container (l).
    pub max_volume: f64,
    /// Minimum dead volume (l).
    pub min_dead_volume: f64,
    /// Maximum dead volume (l).
    pub max_dead_volume: f64,
}

impl ReservoirSpecs {
    pub fn new(name: impl Into<String>, max_ul: f64, min_dead_ul: f64, max_dead_ul: f64) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            max_volume: ul_to_liters(max_ul),
            min_dead_volume: ul_to_liters(min_dead_ul),
            max_dead_volume: ul_to_liters(max_dead_ul),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Role-specific default methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultMethods {
    /// Used for rack sector transfers.
    pub sector: String,
    /// Used for position transfers.
    pub non_sector: String,
    /// Used for transfers out of stock tubes.
    pub stock: String,
}

/// Pipetting specs by method name.
#[derive(Debug, Clone, PartialEq)]
pub struct PipettingSpecsRegistry {
    specs: BTreeMap<String, PipettingSpecs>,
    defaults: DefaultMethods,
}

impl PipettingSpecsRegistry {
    /// Creates a registry. The default methods must be registered.
    pub fn new(specs: Vec<PipettingSpecs>, defaults: DefaultMethods) -> Result<Self, PlanningError> {
        let mut map = BTreeMap::new();
        for s in specs {
            if map.contains_key(&s.name) {
                return Err(PlanningError::consistency(format!(
                    "pipetting method {:?} is specified multiple times",
                    s.name
                )));
            }
            map.insert(s.name.clone(), s);
        }
        for name in [&defaults.sector, &defaults.non_sector, &defaults.stock] {
            if !map.contains_key(name) {
                return Err(PlanningError::input(format!(
                    "default pipetting method {name:?} is not registered"
                )));
            }
        }
        Ok(Self {
            specs: map,
            defaults,
        })
    }

    /// Returns the specs for a method name.
    pub fn get(&self, name: &str) -> Result<&PipettingSpecs, PlanningError> {
        self.specs
            .get(name)
            .ok_or_else(|| PlanningError::input(format!("unknown pipetting method {name:?}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn defaults(&self) -> &DefaultMethods {
        &self.defaults
    }

    pub fn sector(&self) -> &PipettingSpecs {
        &self.specs[&self.defaults.sector]
    }

    pub fn non_sector(&self) -> &PipettingSpecs {
        &self.specs[&self.defaults.non_sector]
    }

    pub fn stock(&self) -> &PipettingSpecs {
        &self.specs[&self.defaults.stock]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(|k| k.as_str())
    }
}
