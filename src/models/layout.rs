//! Plate layouts.
//!
//! A plate layout describes, per rack position, which molecule design pool
//! a plate needs, whether the sample originates from a stock tube
//! ("starting well") and how much is taken out of the stock for it.
//!
//! # Ownership
//! Final plate positions are prepared either by the ISO itself or by the
//! ISO job shared by several ISOs (`for_job`). Job-owned positions are
//! identical across the ISOs of one job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::position::{RackPosition, RackShape};
use super::volume::{liters_to_ul, molar_to_nm, volume_in_liters};
use crate::error::PlanningError;

/// Molecule design pool identifier.
pub type PoolId = u64;

/// A molecule design pool as far as stock handling is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoleculeDesignPool {
    pub id: PoolId,
    /// Default stock concentration (M).
    pub default_stock_concentration: f64,
}

impl MoleculeDesignPool {
    pub fn new(id: PoolId, default_stock_concentration: f64) -> Self {
        Self {
            id,
            default_stock_concentration,
        }
    }

    /// Stock concentration in nM, rounded to one decimal.
    pub fn stock_concentration_nm(&self) -> f64 {
        molar_to_nm(self.default_stock_concentration)
    }
}

/// Role of a layout position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    /// A specific pool, the same for every ISO.
    Fixed,
    /// A placeholder filled with a different pool per ISO.
    Floating,
    /// A pool from a screening library.
    Library,
    /// Buffer only.
    Mock,
    /// Unused.
    Empty,
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fixed => "fixed",
            Self::Floating => "floating",
            Self::Library => "library",
            Self::Mock => "mock",
            Self::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// A transfer destination of a stock tube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTarget {
    pub position: RackPosition,
    /// Transfer volume (l).
    pub volume: f64,
    /// Target plate marker; `None` = same plate.
    pub target_plate: Option<String>,
}

impl TransferTarget {
    /// Creates a target. `volume` follows the input unit convention.
    pub fn new(position: RackPosition, volume: f64) -> Self {
        Self {
            position,
            volume: volume_in_liters(volume),
            target_plate: None,
        }
    }

    pub fn on_plate(mut self, plate_marker: impl Into<String>) -> Self {
        self.target_plate = Some(plate_marker.into());
        self
    }
}

/// One position of a plate layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatePosition {
    pub position: RackPosition,
    pub position_type: PositionType,
    pub pool: Option<MoleculeDesignPool>,
    /// Whether the sample is transferred in from a stock tube.
    pub starting_well: bool,
    /// Volume taken out of the stock for this position (l).
    pub stock_takeout_volume: Option<f64>,
    /// Final plate positions prepared by the ISO job.
    pub for_job: bool,
    /// Stock tube scheduled by the planner.
    pub stock_tube_barcode: Option<String>,
    /// Rack the scheduled stock tube is expected in.
    pub stock_rack_barcode: Option<String>,
    /// Sector of a sector-bound stock transfer.
    pub sector_index: Option<u8>,
}

impl PlatePosition {
    /// Creates a position for a pool.
    pub fn new(position: RackPosition, position_type: PositionType, pool: MoleculeDesignPool) -> Self {
        Self {
            position,
            position_type,
            pool: Some(pool),
            starting_well: false,
            stock_takeout_volume: None,
            for_job: false,
            stock_tube_barcode: None,
            stock_rack_barcode: None,
            sector_index: None,
        }
    }

    /// Creates a buffer-only position.
    pub fn mock(position: RackPosition) -> Self {
        Self {
            position,
            position_type: PositionType::Mock,
            pool: None,
            starting_well: false,
            stock_takeout_volume: None,
            for_job: false,
            stock_tube_barcode: None,
            stock_rack_barcode: None,
            sector_index: None,
        }
    }

    /// Marks the position as starting well with a stock takeout volume
    /// (input unit convention).
    pub fn with_stock_takeout(mut self, volume: f64) -> Self {
        self.starting_well = true;
        self.stock_takeout_volume = Some(volume_in_liters(volume));
        self
    }

    pub fn owned_by_job(mut self) -> Self {
        self.for_job = true;
        self
    }

    pub fn with_stock_tube(mut self, tube_barcode: impl Into<String>, rack_barcode: impl Into<String>) -> Self {
        self.stock_tube_barcode = Some(tube_barcode.into());
        self.stock_rack_barcode = Some(rack_barcode.into());
        self
    }

    pub fn with_sector(mut self, sector_index: u8) -> Self {
        self.sector_index = Some(sector_index);
        self
    }

    /// Whether the sample comes from a stock tube.
    pub fn is_starting_well(&self) -> bool {
        self.starting_well
    }

    /// Stock takeout volume in µl (0 if none).
    pub fn stock_takeout_volume_ul(&self) -> f64 {
        self.stock_takeout_volume.map(liters_to_ul).unwrap_or(0.0)
    }

    pub fn pool_id(&self) -> Option<PoolId> {
        self.pool.as_ref().map(|p| p.id)
    }
}

/// A plate layout: positions by rack position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateLayout {
    pub shape: RackShape,
    positions: BTreeMap<RackPosition, PlatePosition>,
}

impl PlateLayout {
    pub fn new(shape: RackShape) -> Self {
        Self {
            shape,
            positions: BTreeMap::new(),
        }
    }

    /// Adds a position. Fails on duplicates and positions outside the shape.
    pub fn add_position(&mut self, position: PlatePosition) -> Result<(), PlanningError> {
        if !self.shape.contains(&position.position) {
            return Err(PlanningError::input(format!(
                "position {} lies outside the {} layout",
                position.position, self.shape
            )));
        }
        if self.positions.contains_key(&position.position) {
            return Err(PlanningError::consistency(format!(
                "position {} has been specified multiple times",
                position.position
            )));
        }
        self.positions.insert(position.position, position);
        Ok(())
    }

    /// Builder variant of [`add_position`](Self::add_position).
    pub fn with_position(mut self, position: PlatePosition) -> Result<Self, PlanningError> {
        self.add_position(position)?;
        Ok(self)
    }

    pub fn get(&self, position: &RackPosition) -> Option<&PlatePosition> {
        self.positions.get(position)
    }

    /// Non-empty positions in position order.
    pub fn sorted_working_positions(&self) -> impl Iterator<Item = &PlatePosition> {
        self.positions
            .values()
            .filter(|p| p.position_type != PositionType::Empty)
    }

    /// Starting wells in position order.
    pub fn starting_positions(&self) -> impl Iterator<Item = &PlatePosition> {
        self.sorted_working_positions().filter(|p| p.is_starting_well())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
