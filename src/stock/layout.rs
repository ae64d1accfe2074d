//! Stock rack layouts.
//!
//! A stock rack layout says which tube sits at which stock rack position
//! and where its sample goes: per target plate, the positions and
//! volumes to transfer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PlanningError;
use crate::models::{PlannedTransfer, PoolId, RackPosition, RackShape, TransferCatalog, TransferTarget};

/// One tube of a stock rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRackPosition {
    pub position: RackPosition,
    pub pool_id: PoolId,
    pub tube_barcode: String,
    /// Targets, each carrying its plate marker.
    pub transfer_targets: Vec<TransferTarget>,
}

impl StockRackPosition {
    pub fn new(position: RackPosition, pool_id: PoolId, tube_barcode: impl Into<String>) -> Self {
        Self {
            position,
            pool_id,
            tube_barcode: tube_barcode.into(),
            transfer_targets: Vec::new(),
        }
    }

    /// Adds a target on `plate_marker`.
    pub fn add_target(&mut self, plate_marker: &str, target: TransferTarget) {
        self.transfer_targets.push(target.on_plate(plate_marker));
    }

    /// Planned transfers into one target plate.
    pub fn planned_transfers(&self, plate_marker: &str, catalog: &mut TransferCatalog) -> Vec<PlannedTransfer> {
        self.transfer_targets
            .iter()
            .filter(|t| t.target_plate.as_deref() == Some(plate_marker))
            .map(|t| catalog.transfer(t.volume, self.position, t.position))
            .collect()
    }
}

/// Layout of one stock rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRackLayout {
    pub shape: RackShape,
    positions: BTreeMap<RackPosition, StockRackPosition>,
}

impl Default for StockRackLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl StockRackLayout {
    /// An empty 96-position layout.
    pub fn new() -> Self {
        Self {
            shape: RackShape::SHAPE_96,
            positions: BTreeMap::new(),
        }
    }

    pub fn add_position(&mut self, position: StockRackPosition) -> Result<(), PlanningError> {
        if !self.shape.contains(&position.position) {
            return Err(PlanningError::assignment(format!(
                "stock rack position {} lies outside the rack",
                position.position
            )));
        }
        if self.positions.contains_key(&position.position) {
            return Err(PlanningError::assignment(format!(
                "stock rack position {} is already occupied",
                position.position
            )));
        }
        self.positions.insert(position.position, position);
        Ok(())
    }

    pub fn get(&self, position: &RackPosition) -> Option<&StockRackPosition> {
        self.positions.get(position)
    }

    /// Positions in position order.
    pub fn working_positions(&self) -> impl Iterator<Item = &StockRackPosition> {
        self.positions.values()
    }

    /// Tube barcodes by position.
    pub fn tube_barcodes(&self) -> BTreeMap<RackPosition, &str> {
        self.positions
            .iter()
            .map(|(p, sp)| (*p, sp.tube_barcode.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
