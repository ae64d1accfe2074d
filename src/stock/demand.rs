//! Stock demand aggregation.
//!
//! Scans the plate layouts of an ISO or ISO job for starting wells and
//! collects, per pool, every position that needs stock. Final plate
//! positions are split by ownership: an ISO only takes the positions it
//! prepares itself, a job only the job-owned ones.
//!
//! For jobs, the final layouts of all ISOs must agree on their job-owned
//! starting wells; one of them serves as the reference layout.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::container::StockTubeContainer;
use crate::error::{finish, joined, PlanningError, PlanningResult};
use crate::models::{PlateLayout, PlatePosition, PoolId, PositionType};
use crate::planning::labels::ROLE_FINAL;
use crate::planning::EntityKind;

/// Per-pool stock demand, sorted by pool.
pub type StockDemand = BTreeMap<PoolId, StockTubeContainer>;

#[derive(Debug, Clone, Copy)]
enum FinalLayouts<'a> {
    Single(&'a PlateLayout),
    PerIso(&'a BTreeMap<String, PlateLayout>),
}

/// Aggregates the stock demand of an ISO or ISO job.
#[derive(Debug, Clone)]
pub struct StockDemandAggregator<'a> {
    entity: EntityKind,
    final_marker: String,
    preparation_layouts: &'a BTreeMap<String, PlateLayout>,
    final_layouts: FinalLayouts<'a>,
    final_copy_count: usize,
}

impl<'a> StockDemandAggregator<'a> {
    /// Aggregator for one ISO. `final_copy_count` is the number of final
    /// plates of the ISO.
    pub fn iso(
        preparation_layouts: &'a BTreeMap<String, PlateLayout>,
        final_layout: &'a PlateLayout,
        final_copy_count: usize,
    ) -> Self {
        Self {
            entity: EntityKind::Iso,
            final_marker: ROLE_FINAL.to_string(),
            preparation_layouts,
            final_layouts: FinalLayouts::Single(final_layout),
            final_copy_count,
        }
    }

    /// Aggregator for an ISO job. `final_layouts` maps ISO labels onto
    /// their final layouts; `final_copy_count` is the number of final
    /// plates of all ISOs.
    pub fn job(
        job_preparation_layouts: &'a BTreeMap<String, PlateLayout>,
        final_layouts: &'a BTreeMap<String, PlateLayout>,
        final_copy_count: usize,
    ) -> Self {
        Self {
            entity: EntityKind::Job,
            final_marker: ROLE_FINAL.to_string(),
            preparation_layouts: job_preparation_layouts,
            final_layouts: FinalLayouts::PerIso(final_layouts),
            final_copy_count,
        }
    }

    /// Overrides the marker final positions are registered under.
    pub fn with_final_marker(mut self, marker: impl Into<String>) -> Self {
        self.final_marker = marker.into();
        self
    }

    /// Collects the stock demand.
    pub fn run(&self) -> PlanningResult<StockDemand> {
        info!(entity = %self.entity, "aggregating stock demand");

        let final_layout = match self.final_layouts {
            FinalLayouts::Single(layout) => layout,
            FinalLayouts::PerIso(layouts) => match reference_final_layout(layouts) {
                Ok(layout) => layout,
                Err(e) => {
                    warn!(entity = %self.entity, errors = 1, "stock demand aggregation aborted");
                    return Err(vec![e]);
                }
            },
        };

        let mut demand = StockDemand::new();
        let mut errors = Vec::new();
        let mut type_conflicts: BTreeMap<PoolId, BTreeSet<PositionType>> = BTreeMap::new();

        let layouts = self
            .preparation_layouts
            .iter()
            .map(|(label, layout)| (label.as_str(), layout, false))
            .chain(std::iter::once((self.final_marker.as_str(), final_layout, true)));
        for (label, layout, is_final) in layouts {
            for position in layout.starting_positions() {
                if is_final && position.for_job != (self.entity == EntityKind::Job) {
                    continue;
                }
                if let Err(e) = self.register(&mut demand, &mut type_conflicts, label, position, is_final) {
                    errors.push(e);
                }
            }
        }

        for (pool, types) in type_conflicts {
            errors.push(PlanningError::consistency(format!(
                "pool {pool} occurs with different position types: {}",
                joined(types.iter().map(|t| t.to_string()))
            )));
        }
        if errors.is_empty() && demand.is_empty() && self.entity == EntityKind::Job {
            errors.push(PlanningError::input(
                "no stock transfer needed for this ISO job: all pools are prepared by the ISOs",
            ));
        }

        if !errors.is_empty() {
            warn!(entity = %self.entity, errors = errors.len(), "stock demand aggregation aborted");
        } else {
            info!(entity = %self.entity, pools = demand.len(), "stock demand aggregation completed");
        }
        finish(demand, errors)
    }

    fn register(
        &self,
        demand: &mut StockDemand,
        type_conflicts: &mut BTreeMap<PoolId, BTreeSet<PositionType>>,
        plate_label: &str,
        position: &PlatePosition,
        is_final: bool,
    ) -> Result<(), PlanningError> {
        let Some(pool_id) = position.pool_id() else {
            return Err(PlanningError::input(format!(
                "starting position {} on plate {plate_label:?} has no pool",
                position.position
            )));
        };
        if !demand.contains_key(&pool_id) {
            let container =
                StockTubeContainer::from_plate_position(position, self.final_marker.as_str(), self.final_copy_count)?;
            debug!(pool = pool_id, plate = plate_label, "new stock tube container");
            demand.insert(pool_id, container);
        }
        let Some(container) = demand.get_mut(&pool_id) else {
            return Ok(());
        };
        if container.position_type() != position.position_type {
            let types = type_conflicts.entry(pool_id).or_default();
            types.insert(container.position_type());
            types.insert(position.position_type);
        }
        if is_final {
            container.add_final_position(position.clone());
        } else {
            container.add_preparation_position(plate_label, position.clone());
        }
        Ok(())
    }
}

/// Compares the job-owned starting wells of all ISO final layouts and
/// returns the reference layout (the one of the first ISO by label).
pub fn reference_final_layout(final_layouts: &BTreeMap<String, PlateLayout>) -> Result<&PlateLayout, PlanningError> {
    let job_positions = |layout: &PlateLayout| -> Vec<PlatePosition> {
        layout
            .starting_positions()
            .filter(|p| p.for_job)
            .cloned()
            .collect()
    };

    let mut isos = final_layouts.iter();
    let Some((reference_iso, reference_layout)) = isos.next() else {
        return Err(PlanningError::consistency(
            "the ISO job has no ISOs, so there is no final layout to compare against",
        ));
    };
    let reference_positions = job_positions(reference_layout);
    let differing: Vec<&str> = isos
        .filter(|(_, layout)| job_positions(*layout) != reference_positions)
        .map(|(label, _)| label.as_str())
        .collect();
    if !differing.is_empty() {
        return Err(PlanningError::consistency(format!(
            "the final layouts of the ISOs in this job differ; reference ISO: {reference_iso}, differing ISOs: {}",
            joined(differing)
        )));
    }
    Ok(reference_layout)
}
