//! Stock rack assignment.
//!
//! Places the picked stock tubes into empty tube racks (stock racks) and
//! plans the transfers out of them. Every stock rack gets a layout and its
//! own worklist series with one transfer worklist per target plate.
//!
//! # Validation
//! All barcode problems are collected before anything is built:
//! unknown barcodes, racks that are not empty and too few usable racks.
//! On failure the entity keeps its previous stock racks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::container::{TubeCandidate, STOCK_DEAD_VOLUME_UL};
use super::demand::StockDemand;
use super::layout::{StockRackLayout, StockRackPosition};
use crate::error::{joined, PlanningError, PlanningResult};
use crate::models::volume::{format_ul, is_smaller_than, liters_to_ul};
use crate::models::{
    PipettingSpecsRegistry, PlannedWorklist, PoolId, RackLookup, RackShape, TransferCatalog, TransferTarget,
    TransferType, WorklistSeries,
};
use crate::planning::labels::{create_rack_label, create_rack_marker, create_worklist_label, ROLE_STOCK};
use crate::planning::EntityKind;

/// A tube rack holding stock tubes for an ISO or job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRack {
    pub marker: String,
    pub label: String,
    pub rack_barcode: String,
    /// Target sector for sector-bound stock racks.
    pub sector_index: Option<u8>,
    pub layout: StockRackLayout,
    pub worklist_series: WorklistSeries,
}

/// An ISO or ISO job receiving stock racks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRackEntity {
    pub label: String,
    pub kind: EntityKind,
    /// Minimum number of stock racks the entity requires.
    pub number_stock_racks: usize,
    pub stock_racks: Vec<StockRack>,
}

impl StockRackEntity {
    pub fn new(label: impl Into<String>, kind: EntityKind, number_stock_racks: usize) -> Self {
        Self {
            label: label.into(),
            kind,
            number_stock_racks,
            stock_racks: Vec::new(),
        }
    }
}

/// Pools sharing one stock rack.
struct RackGroup {
    sector_index: Option<u8>,
    pools: Vec<PoolId>,
}

/// Assigns stock racks to an ISO or ISO job.
pub struct StockRackAssigner<'a, L: RackLookup + ?Sized> {
    ticket_number: u32,
    demand: &'a StockDemand,
    registry: &'a PipettingSpecsRegistry,
    racks: &'a L,
    tube_candidates: BTreeMap<PoolId, TubeCandidate>,
    plate_order: Vec<String>,
}

impl<'a, L: RackLookup + ?Sized> StockRackAssigner<'a, L> {
    pub fn new(
        ticket_number: u32,
        demand: &'a StockDemand,
        registry: &'a PipettingSpecsRegistry,
        racks: &'a L,
    ) -> Self {
        Self {
            ticket_number,
            demand,
            registry,
            racks,
            tube_candidates: BTreeMap::new(),
            plate_order: Vec::new(),
        }
    }

    /// Tubes picked per pool.
    pub fn with_tube_candidates(mut self, candidates: BTreeMap<PoolId, TubeCandidate>) -> Self {
        self.tube_candidates = candidates;
        self
    }

    /// Plate markers in processing order (see `IsoPlan::plate_order`).
    pub fn with_plate_order(mut self, plate_order: Vec<String>) -> Self {
        self.plate_order = plate_order;
        self
    }

    /// Assigns stock racks built from `rack_barcodes` to `entity`.
    ///
    /// Existing stock racks of the entity are replaced. Blank barcodes are
    /// ignored. On failure the entity is left untouched.
    pub fn assign(&self, entity: &mut StockRackEntity, rack_barcodes: &[String]) -> PlanningResult<()> {
        info!(entity = %entity.label, barcodes = rack_barcodes.len(), "assigning stock racks");

        let mut errors = Vec::new();
        let valid_barcodes = self.check_barcodes(rack_barcodes, &mut errors);
        self.check_tube_candidates(&mut errors);
        self.check_target_plates(&mut errors);
        let groups = self.group_pools();
        let required = entity.number_stock_racks.max(groups.len());
        if errors.is_empty() && valid_barcodes.len() < required {
            errors.push(PlanningError::assignment(format!(
                "the number of stock rack barcodes is too low: expected {required}, found {}",
                valid_barcodes.len()
            )));
        }
        if !errors.is_empty() {
            warn!(entity = %entity.label, errors = errors.len(), "stock rack assignment aborted");
            return Err(errors);
        }

        let mut catalog = TransferCatalog::new();
        let mut stock_racks = Vec::with_capacity(groups.len());
        for (number, (group, barcode)) in groups.iter().zip(valid_barcodes).enumerate() {
            match self.build_stock_rack(number as u32 + 1, entity.kind, group, barcode, &mut catalog) {
                Ok(rack) => stock_racks.push(rack),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            warn!(entity = %entity.label, errors = errors.len(), "stock rack assignment aborted");
            return Err(errors);
        }

        info!(entity = %entity.label, stock_racks = stock_racks.len(), "stock rack assignment completed");
        entity.stock_racks = stock_racks;
        Ok(())
    }

    /// Returns the sorted barcodes of known empty racks; records errors for
    /// unknown and non-empty racks.
    fn check_barcodes<'b>(&self, rack_barcodes: &'b [String], errors: &mut Vec<PlanningError>) -> Vec<&'b str> {
        let mut valid = BTreeSet::new();
        let mut unknown = BTreeSet::new();
        let mut non_empty = BTreeSet::new();
        for barcode in rack_barcodes.iter().map(|b| b.trim()).filter(|b| !b.is_empty()) {
            match self.racks.find_rack(barcode) {
                None => {
                    unknown.insert(barcode);
                }
                Some(rack) if !rack.is_empty() => {
                    non_empty.insert(barcode);
                }
                Some(_) => {
                    valid.insert(barcode);
                }
            }
        }
        if !unknown.is_empty() {
            errors.push(PlanningError::assignment(format!(
                "the following racks have not been found: {}",
                joined(unknown)
            )));
        }
        if !non_empty.is_empty() {
            errors.push(PlanningError::assignment(format!(
                "the following racks you have chosen are not empty: {}",
                joined(non_empty)
            )));
        }
        valid.into_iter().collect()
    }

    fn check_tube_candidates(&self, errors: &mut Vec<PlanningError>) {
        let mut missing = Vec::new();
        let mut insufficient = Vec::new();
        for (pool_id, container) in self.demand {
            let Some(candidate) = self.tube_candidates.get(pool_id) else {
                missing.push(pool_id.to_string());
                continue;
            };
            let required = container.total_required_volume() + STOCK_DEAD_VOLUME_UL;
            let available = liters_to_ul(candidate.volume);
            if is_smaller_than(available, required) {
                insufficient.push(format!(
                    "{pool_id} (tube {}: {} µl, required {} µl)",
                    candidate.tube_barcode,
                    format_ul(available),
                    format_ul(required)
                ));
            }
        }
        if !missing.is_empty() {
            errors.push(PlanningError::assignment(format!(
                "no stock tube has been picked for the following pools: {}",
                joined(missing)
            )));
        }
        if !insufficient.is_empty() {
            errors.push(PlanningError::assignment(format!(
                "the picked tubes do not contain enough volume for the following pools: {}",
                joined(insufficient)
            )));
        }
    }

    fn check_target_plates(&self, errors: &mut Vec<PlanningError>) {
        let unknown: BTreeSet<&str> = self
            .demand
            .values()
            .flat_map(|c| c.plate_target_positions().into_keys())
            .filter(|plate| !self.plate_order.iter().any(|p| p == plate))
            .collect();
        if !unknown.is_empty() {
            errors.push(PlanningError::input(format!(
                "stock transfers target plates outside the plate order: {}",
                joined(unknown)
            )));
        }
    }

    /// Sector-bound pools get one rack per sector; the others are packed
    /// into racks of 96 in pool order.
    fn group_pools(&self) -> Vec<RackGroup> {
        let capacity = RackShape::SHAPE_96.size();
        let mut by_sector: BTreeMap<Option<u8>, Vec<PoolId>> = BTreeMap::new();
        for (pool_id, container) in self.demand {
            by_sector.entry(container.sector_index()).or_default().push(*pool_id);
        }
        let mut groups = Vec::new();
        // sector racks first, then the unbound ones
        let unbound = by_sector.remove(&None).unwrap_or_default();
        for (sector_index, pools) in by_sector.into_iter().chain(std::iter::once((None, unbound))) {
            for chunk in pools.chunks(capacity) {
                groups.push(RackGroup {
                    sector_index,
                    pools: chunk.to_vec(),
                });
            }
        }
        groups
    }

    fn build_stock_rack(
        &self,
        number: u32,
        kind: EntityKind,
        group: &RackGroup,
        barcode: &str,
        catalog: &mut TransferCatalog,
    ) -> Result<StockRack, PlanningError> {
        let marker = create_rack_marker(ROLE_STOCK, number);
        let mut layout = StockRackLayout::new();
        let positions = layout.shape.positions_by_column();
        for (position, pool_id) in positions.into_iter().zip(&group.pools) {
            let container = &self.demand[pool_id];
            let candidate = self.tube_candidates.get(pool_id).ok_or_else(|| {
                PlanningError::assignment(format!("no stock tube has been picked for pool {pool_id}"))
            })?;
            let mut stock_position = StockRackPosition::new(position, *pool_id, candidate.tube_barcode.clone());
            for (plate, targets) in container.plate_target_positions() {
                for target in targets {
                    if let Some(volume) = target.stock_takeout_volume {
                        stock_position.add_target(plate, TransferTarget::new(target.position, volume));
                    }
                }
            }
            layout.add_position(stock_position)?;
        }

        // sector transfers out of stock racks are an ISO matter; jobs use the stock method
        let method = match (kind, group.sector_index) {
            (EntityKind::Iso, Some(_)) => self.registry.sector(),
            _ => self.registry.stock(),
        };
        let mut series = WorklistSeries::new();
        for plate in &self.plate_order {
            let transfers: Vec<_> = layout
                .working_positions()
                .flat_map(|sp| sp.planned_transfers(plate, catalog))
                .collect();
            if transfers.is_empty() {
                continue;
            }
            let index = series.next_index();
            let label = create_worklist_label(self.ticket_number, index, plate, Some(&marker));
            debug!(label = %label, index, transfers = transfers.len(), "stock transfer worklist created");
            let worklist = PlannedWorklist::new(label, TransferType::Transfer, method.name.clone(), transfers)?;
            series.add_worklist(index, worklist)?;
        }

        Ok(StockRack {
            label: create_rack_label(self.ticket_number, &marker),
            marker,
            rack_barcode: barcode.to_string(),
            sector_index: group.sector_index,
            layout,
            worklist_series: series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipettingConfig;
    use crate::error::ErrorKind;
    use crate::models::{
        Container, ContainerSpecs, MoleculeDesignPool, PlateLayout, PlatePosition, PositionType, Rack,
        RackPosition,
    };
    use crate::stock::StockDemandAggregator;
    use std::collections::HashMap;

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    fn starting(label: &str, pool_id: PoolId) -> PlatePosition {
        PlatePosition::new(pos(label), PositionType::Fixed, MoleculeDesignPool::new(pool_id, 0.00005))
            .with_stock_takeout(2.0)
    }

    fn registry() -> PipettingSpecsRegistry {
        PipettingConfig::standard().registry().unwrap()
    }

    fn demand() -> StockDemand {
        let mut p1 = PlateLayout::new(RackShape::SHAPE_96);
        p1.add_position(starting("A1", 1)).unwrap();
        p1.add_position(starting("B1", 2)).unwrap();
        let mut final_layout = PlateLayout::new(RackShape::SHAPE_96);
        final_layout.add_position(starting("A1", 1)).unwrap();
        final_layout.add_position(starting("C1", 3)).unwrap();
        let prep = BTreeMap::from([("p1".to_string(), p1)]);
        StockDemandAggregator::iso(&prep, &final_layout, 2).run().unwrap()
    }

    fn candidates(pools: &[PoolId]) -> BTreeMap<PoolId, TubeCandidate> {
        pools
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let position = RackShape::SHAPE_96.positions_by_column()[i];
                (*p, TubeCandidate::new(*p, format!("tube{p}"), "09000001", position, 50.0))
            })
            .collect()
    }

    fn inventory() -> HashMap<String, Rack> {
        let occupied = Rack::tube_rack("09000001", RackShape::SHAPE_96).with_container(
            pos("A1"),
            Container::new(ContainerSpecs::new(1500.0, 5.0)).with_barcode("tube1"),
        );
        [
            Rack::tube_rack("09100001", RackShape::SHAPE_96),
            Rack::tube_rack("09100002", RackShape::SHAPE_96),
            occupied,
        ]
        .into_iter()
        .map(|r| (r.barcode.clone(), r))
        .collect()
    }

    fn plate_order() -> Vec<String> {
        vec!["p1".to_string(), "a".to_string()]
    }

    fn barcodes(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_assign_builds_layout_and_series() {
        let (demand, registry, racks) = (demand(), registry(), inventory());
        let assigner = StockRackAssigner::new(123, &demand, &registry, &racks)
            .with_tube_candidates(candidates(&[1, 2, 3]))
            .with_plate_order(plate_order());
        let mut entity = StockRackEntity::new("123_iso_01", EntityKind::Iso, 1);
        assigner.assign(&mut entity, &barcodes(&["09100002", " "])).unwrap();

        assert_eq!(entity.stock_racks.len(), 1);
        let rack = &entity.stock_racks[0];
        assert_eq!(rack.marker, "s1");
        assert_eq!(rack.label, "123_s1");
        assert_eq!(rack.rack_barcode, "09100002");
        // pools are placed column-wise
        let placed: Vec<(String, PoolId)> = rack
            .layout
            .working_positions()
            .map(|p| (p.position.label(), p.pool_id))
            .collect();
        assert_eq!(
            placed,
            vec![("A1".to_string(), 1), ("B1".to_string(), 2), ("C1".to_string(), 3)]
        );

        let labels: Vec<&str> = rack.worklist_series.sorted_worklists().map(|w| w.label()).collect();
        assert_eq!(labels, vec!["123_00_s1_to_p1", "123_01_s1_to_a"]);
        assert_eq!(rack.worklist_series.indices(), vec![0, 1]);
        let to_final = rack.worklist_series.get_worklist_for_index(1).unwrap();
        assert_eq!(to_final.len(), 2);
        assert_eq!(to_final.pipetting_method(), "BioMekStock");
    }

    #[test]
    fn test_required_two_racks_only_one_empty() {
        let (demand, registry, racks) = (demand(), registry(), inventory());
        let assigner = StockRackAssigner::new(123, &demand, &registry, &racks)
            .with_tube_candidates(candidates(&[1, 2, 3]))
            .with_plate_order(plate_order());
        let previous = StockRack {
            marker: "s1".into(),
            label: "123_s1".into(),
            rack_barcode: "09000001".into(),
            sector_index: None,
            layout: StockRackLayout::new(),
            worklist_series: WorklistSeries::new(),
        };
        let mut entity = StockRackEntity::new("123_iso_01", EntityKind::Iso, 2);
        entity.stock_racks.push(previous.clone());

        let errors = assigner
            .assign(&mut entity, &barcodes(&["09100001", "09000001"]))
            .unwrap_err();
        assert!(errors.iter().all(|e| e.kind() == ErrorKind::Assignment));
        assert!(errors.iter().any(|e| e.message().contains("not empty: 09000001")));
        assert_eq!(entity.stock_racks, vec![previous]);
    }

    #[test]
    fn test_count_too_low() {
        let (demand, registry, racks) = (demand(), registry(), inventory());
        let assigner = StockRackAssigner::new(123, &demand, &registry, &racks)
            .with_tube_candidates(candidates(&[1, 2, 3]))
            .with_plate_order(plate_order());
        let mut entity = StockRackEntity::new("123_iso_01", EntityKind::Iso, 2);
        let errors = assigner.assign(&mut entity, &barcodes(&["09100001"])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("expected 2, found 1"));
        assert!(entity.stock_racks.is_empty());
    }

    #[test]
    fn test_barcode_errors_are_aggregated() {
        let (demand, registry, racks) = (demand(), registry(), inventory());
        let assigner = StockRackAssigner::new(123, &demand, &registry, &racks)
            .with_tube_candidates(candidates(&[1, 3]))
            .with_plate_order(plate_order());
        let mut entity = StockRackEntity::new("123_iso_01", EntityKind::Iso, 1);
        let errors = assigner
            .assign(&mut entity, &barcodes(&["09999999", "09000001", "09888888", "09100001"]))
            .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message().contains("09888888, 09999999"));
        assert!(errors[1].message().contains("09000001"));
        assert!(errors[2].message().ends_with("pools: 2"));
    }

    #[test]
    fn test_insufficient_tube_volume() {
        let (demand, registry, racks) = (demand(), registry(), inventory());
        let mut tubes = candidates(&[1, 2, 3]);
        if let Some(tube) = tubes.get_mut(&1) {
            tube.volume = 0.000008;
        }
        let assigner = StockRackAssigner::new(123, &demand, &registry, &racks)
            .with_tube_candidates(tubes)
            .with_plate_order(plate_order());
        let mut entity = StockRackEntity::new("123_iso_01", EntityKind::Iso, 1);
        let errors = assigner.assign(&mut entity, &barcodes(&["09100001"])).unwrap_err();
        assert!(errors[0].message().contains("tube1: 8.0 µl, required 11.0 µl"));
    }

    fn sector_demand() -> StockDemand {
        let mut final_layout = PlateLayout::new(RackShape::SHAPE_384);
        final_layout.add_position(starting("A1", 1).with_sector(0)).unwrap();
        final_layout.add_position(starting("A2", 2).with_sector(1)).unwrap();
        final_layout.add_position(starting("C1", 3)).unwrap();
        let prep = BTreeMap::new();
        StockDemandAggregator::iso(&prep, &final_layout, 1).run().unwrap()
    }

    #[test]
    fn test_sector_pools_get_own_racks() {
        let demand = sector_demand();
        let (registry, racks) = (registry(), inventory());
        let mut racks = racks;
        racks.insert("09100003".into(), Rack::tube_rack("09100003", RackShape::SHAPE_96));

        let assigner = StockRackAssigner::new(9, &demand, &registry, &racks)
            .with_tube_candidates(candidates(&[1, 2, 3]))
            .with_plate_order(vec!["a".to_string()]);
        let mut entity = StockRackEntity::new("9_iso_01", EntityKind::Iso, 1);
        assigner
            .assign(&mut entity, &barcodes(&["09100003", "09100001", "09100002"]))
            .unwrap();

        let summary: Vec<(Option<u8>, &str, &str)> = entity
            .stock_racks
            .iter()
            .map(|r| {
                let method = r.worklist_series.get_worklist_for_index(0).unwrap().pipetting_method();
                (r.sector_index, r.rack_barcode.as_str(), method)
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (Some(0), "09100001", "CyBio"),
                (Some(1), "09100002", "CyBio"),
                (None, "09100003", "BioMekStock"),
            ]
        );
    }

    #[test]
    fn test_job_sector_racks_use_stock_method() {
        let demand = sector_demand();
        let (registry, mut racks) = (registry(), inventory());
        racks.insert("09100003".into(), Rack::tube_rack("09100003", RackShape::SHAPE_96));

        let assigner = StockRackAssigner::new(9, &demand, &registry, &racks)
            .with_tube_candidates(candidates(&[1, 2, 3]))
            .with_plate_order(vec!["a".to_string()]);
        let mut entity = StockRackEntity::new("9_job_01", EntityKind::Job, 1);
        assigner
            .assign(&mut entity, &barcodes(&["09100001", "09100002", "09100003"]))
            .unwrap();

        assert_eq!(entity.stock_racks.len(), 3);
        assert_eq!(entity.stock_racks[0].sector_index, Some(0));
        for rack in &entity.stock_racks {
            let worklist = rack.worklist_series.get_worklist_for_index(0).unwrap();
            assert_eq!(worklist.pipetting_method(), "BioMekStock");
        }
    }
}
