//! Stock tube containers.
//!
//! A stock tube container collects the demand for one molecule design pool:
//! every plate position that receives the pool straight from a stock tube.
//! Containers live for one planning run only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PlanningError;
use crate::models::volume::ul_to_liters;
use crate::models::{MoleculeDesignPool, PlatePosition, PoolId, PositionType, RackPosition};

/// Dead volume of a stock tube (µl).
pub const STOCK_DEAD_VOLUME_UL: f64 = 5.0;

/// A stock tube picked for a pool by the tube picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubeCandidate {
    pub pool_id: PoolId,
    pub tube_barcode: String,
    pub rack_barcode: String,
    pub rack_position: RackPosition,
    /// Sample volume in the tube (l).
    pub volume: f64,
    /// Storage location of the rack, if known.
    pub location: Option<String>,
}

impl TubeCandidate {
    /// Creates a candidate. `volume_ul` is in µl.
    pub fn new(
        pool_id: PoolId,
        tube_barcode: impl Into<String>,
        rack_barcode: impl Into<String>,
        rack_position: RackPosition,
        volume_ul: f64,
    ) -> Self {
        Self {
            pool_id,
            tube_barcode: tube_barcode.into(),
            rack_barcode: rack_barcode.into(),
            rack_position,
            volume: ul_to_liters(volume_ul),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Stock demand of one pool.
#[derive(Debug, Clone, PartialEq)]
pub struct StockTubeContainer {
    pool: MoleculeDesignPool,
    position_type: PositionType,
    /// Tube scheduled by the planner.
    pub requested_tube_barcode: Option<String>,
    expected_rack_barcode: Option<String>,
    final_marker: String,
    preparation_positions: BTreeMap<String, Vec<PlatePosition>>,
    final_positions: Vec<PlatePosition>,
    final_copy_count: usize,
    /// Tube picked for this pool.
    pub tube_candidate: Option<TubeCandidate>,
}

impl StockTubeContainer {
    /// Creates the container for the pool of a starting position.
    ///
    /// Fails for positions without pool.
    pub fn from_plate_position(
        position: &PlatePosition,
        final_marker: impl Into<String>,
        final_copy_count: usize,
    ) -> Result<Self, PlanningError> {
        let pool = position.pool.clone().ok_or_else(|| {
            PlanningError::input(format!("starting position {} has no pool", position.position))
        })?;
        Ok(Self {
            pool,
            position_type: position.position_type,
            requested_tube_barcode: position.stock_tube_barcode.clone(),
            expected_rack_barcode: position.stock_rack_barcode.clone(),
            final_marker: final_marker.into(),
            preparation_positions: BTreeMap::new(),
            final_positions: Vec::new(),
            final_copy_count,
            tube_candidate: None,
        })
    }

    pub fn pool(&self) -> &MoleculeDesignPool {
        &self.pool
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool.id
    }

    pub fn position_type(&self) -> PositionType {
        self.position_type
    }

    pub fn expected_rack_barcode(&self) -> Option<&str> {
        self.expected_rack_barcode.as_deref()
    }

    pub fn final_copy_count(&self) -> usize {
        self.final_copy_count
    }

    /// Registers a preparation plate position.
    pub fn add_preparation_position(&mut self, plate_label: impl Into<String>, position: PlatePosition) {
        self.preparation_positions
            .entry(plate_label.into())
            .or_default()
            .push(position);
    }

    /// Registers a final plate position.
    pub fn add_final_position(&mut self, position: PlatePosition) {
        self.final_positions.push(position);
    }

    /// Target positions by plate label; final positions under the final
    /// plate marker.
    pub fn plate_target_positions(&self) -> BTreeMap<&str, Vec<&PlatePosition>> {
        let mut targets: BTreeMap<&str, Vec<&PlatePosition>> = self
            .preparation_positions
            .iter()
            .map(|(label, positions)| (label.as_str(), positions.iter().collect()))
            .collect();
        if !self.final_positions.is_empty() {
            targets
                .entry(self.final_marker.as_str())
                .or_default()
                .extend(self.final_positions.iter());
        }
        targets
    }

    /// All target positions (final positions first).
    pub fn all_target_positions(&self) -> Vec<&PlatePosition> {
        self.final_positions
            .iter()
            .chain(self.preparation_positions.values().flatten())
            .collect()
    }

    /// Volume to take from the stock (µl): preparation takeouts plus the
    /// final takeouts once per final plate copy.
    pub fn total_required_volume(&self) -> f64 {
        let preparation: f64 = self
            .preparation_positions
            .values()
            .flatten()
            .map(PlatePosition::stock_takeout_volume_ul)
            .sum();
        let final_plate: f64 = self
            .final_positions
            .iter()
            .map(PlatePosition::stock_takeout_volume_ul)
            .sum();
        preparation + final_plate * self.final_copy_count as f64
    }

    /// The plate the stock transfer starts at: the smallest preparation
    /// plate label, or the final plate marker without preparation plates.
    pub fn first_plate(&self) -> &str {
        self.preparation_positions
            .keys()
            .next()
            .map(String::as_str)
            .unwrap_or(self.final_marker.as_str())
    }

    /// Stock concentration of the pool (nM).
    pub fn stock_concentration_nm(&self) -> f64 {
        self.pool.stock_concentration_nm()
    }

    /// Sector index shared by all target positions, if any.
    pub fn sector_index(&self) -> Option<u8> {
        let mut sectors = self.all_target_positions().into_iter().map(|p| p.sector_index);
        let first = sectors.next()??;
        sectors.all(|s| s == Some(first)).then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    fn plate_pos(label: &str, takeout_ul: f64) -> PlatePosition {
        PlatePosition::new(pos(label), PositionType::Fixed, MoleculeDesignPool::new(11, 0.00005))
            .with_stock_takeout(takeout_ul)
    }

    fn container(copies: usize) -> StockTubeContainer {
        let mut c = StockTubeContainer::from_plate_position(&plate_pos("A1", 2.0), "a", copies).unwrap();
        c.add_preparation_position("p2", plate_pos("A1", 2.0));
        c.add_preparation_position("p1", plate_pos("B1", 3.0));
        c.add_final_position(plate_pos("C1", 1.5));
        c.add_final_position(plate_pos("D1", 2.5));
        c
    }

    #[test]
    fn test_total_required_volume() {
        // 2 + 3 + copies * (1.5 + 2.5)
        assert!((container(1).total_required_volume() - 9.0).abs() < 1e-9);
        assert!((container(3).total_required_volume() - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_final_contribution_scales_linearly() {
        let v1 = container(1).total_required_volume();
        let v2 = container(2).total_required_volume();
        let v5 = container(5).total_required_volume();
        assert!(((v5 - v1) - 4.0 * (v2 - v1)).abs() < 1e-9);
    }

    #[test]
    fn test_first_plate() {
        assert_eq!(container(1).first_plate(), "p1");
        let mut only_final = StockTubeContainer::from_plate_position(&plate_pos("A1", 2.0), "a", 1).unwrap();
        only_final.add_final_position(plate_pos("A1", 2.0));
        assert_eq!(only_final.first_plate(), "a");
    }

    #[test]
    fn test_plate_target_positions() {
        let c = container(1);
        let targets = c.plate_target_positions();
        assert_eq!(targets.keys().copied().collect::<Vec<_>>(), vec!["a", "p1", "p2"]);
        assert_eq!(targets["a"].len(), 2);
        assert_eq!(c.all_target_positions().len(), 4);
    }

    #[test]
    fn test_sector_index() {
        let mut c = StockTubeContainer::from_plate_position(&plate_pos("A1", 2.0), "a", 1).unwrap();
        c.add_final_position(plate_pos("A1", 2.0).with_sector(1));
        c.add_final_position(plate_pos("A3", 2.0).with_sector(1));
        assert_eq!(c.sector_index(), Some(1));
        c.add_final_position(plate_pos("A5", 2.0).with_sector(2));
        assert_eq!(c.sector_index(), None);
    }

    #[test]
    fn test_mock_position_rejected() {
        assert!(StockTubeContainer::from_plate_position(&PlatePosition::mock(pos("A1")), "a", 1).is_err());
    }

    #[test]
    fn test_stock_concentration() {
        assert!((container(1).stock_concentration_nm() - 50000.0).abs() < 1e-9);
    }
}
