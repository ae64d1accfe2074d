//! Planning pipeline.
//!
//! Runs the planning stages for one ISO or ISO job:
//!
//! 1. Worklist series generation from the [`IsoPlan`].
//! 2. Stock demand aggregation over the plate layouts.
//! 3. Stock rack assignment for the entity.
//!
//! Each stage reports all of its errors at once. The pipeline stops at the
//! first failing stage; later stages never see the output of a failed one.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::error::{PlanningError, PlanningResult};
use crate::models::{PipettingSpecsRegistry, PlateLayout, PoolId, RackLookup};
use crate::planning::{EntityKind, IsoPlan, SeriesPair, WorklistSeriesGenerator};
use crate::stock::{StockDemand, StockDemandAggregator, StockRackAssigner, StockRackEntity, TubeCandidate};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SeriesGeneration,
    StockDemand,
    StockRackAssignment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SeriesGeneration => "series generation",
            Self::StockDemand => "stock demand",
            Self::StockRackAssignment => "stock rack assignment",
        };
        f.write_str(name)
    }
}

/// Input of one pipeline run.
#[derive(Debug, Clone)]
pub struct PlanningRequest {
    /// Preparation plate layouts by plate marker (job preparation plates
    /// for jobs).
    pub preparation_layouts: BTreeMap<String, PlateLayout>,
    /// Final plate layouts by ISO label. An ISO request holds exactly one.
    pub final_layouts: BTreeMap<String, PlateLayout>,
    /// Number of final plate copies.
    pub final_copy_count: usize,
    /// Picked stock tubes per pool.
    pub tube_candidates: BTreeMap<PoolId, TubeCandidate>,
    /// Barcodes of the racks to use as stock racks.
    pub rack_barcodes: Vec<String>,
}

impl PlanningRequest {
    pub fn new(final_copy_count: usize) -> Self {
        Self {
            preparation_layouts: BTreeMap::new(),
            final_layouts: BTreeMap::new(),
            final_copy_count,
            tube_candidates: BTreeMap::new(),
            rack_barcodes: Vec::new(),
        }
    }

    pub fn with_preparation_layout(mut self, marker: impl Into<String>, layout: PlateLayout) -> Self {
        self.preparation_layouts.insert(marker.into(), layout);
        self
    }

    pub fn with_final_layout(mut self, iso_label: impl Into<String>, layout: PlateLayout) -> Self {
        self.final_layouts.insert(iso_label.into(), layout);
        self
    }

    pub fn with_tube_candidate(mut self, candidate: TubeCandidate) -> Self {
        self.tube_candidates.insert(candidate.pool_id, candidate);
        self
    }

    pub fn with_rack_barcodes(mut self, barcodes: Vec<String>) -> Self {
        self.rack_barcodes = barcodes;
        self
    }
}

/// Output of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PlanningOutput {
    pub series: SeriesPair,
    /// Stock demand with the picked tubes attached.
    pub demand: StockDemand,
}

/// Runs all planning stages for one entity.
pub struct PlanningPipeline<'a, L: RackLookup + ?Sized> {
    plan: &'a IsoPlan,
    registry: &'a PipettingSpecsRegistry,
    racks: &'a L,
}

impl<'a, L: RackLookup + ?Sized> PlanningPipeline<'a, L> {
    pub fn new(plan: &'a IsoPlan, registry: &'a PipettingSpecsRegistry, racks: &'a L) -> Self {
        Self { plan, registry, racks }
    }

    /// Runs the pipeline. On success the stock racks of `entity` are
    /// replaced; on failure `entity` is unchanged.
    pub fn run(&self, request: &PlanningRequest, entity: &mut StockRackEntity) -> PlanningResult<PlanningOutput> {
        info!(
            ticket = self.plan.ticket_number,
            entity = %entity.label,
            kind = %entity.kind,
            "planning pipeline started"
        );

        let series = stage(Stage::SeriesGeneration, || {
            WorklistSeriesGenerator::new(self.plan, self.registry).run()
        })?;

        let mut demand = stage(Stage::StockDemand, || self.aggregate(request, entity.kind))?;
        for (pool_id, container) in demand.iter_mut() {
            container.tube_candidate = request.tube_candidates.get(pool_id).cloned();
        }

        stage(Stage::StockRackAssignment, || {
            StockRackAssigner::new(self.plan.ticket_number, &demand, self.registry, self.racks)
                .with_tube_candidates(request.tube_candidates.clone())
                .with_plate_order(self.plan.plate_order())
                .assign(entity, &request.rack_barcodes)
        })?;

        info!(
            ticket = self.plan.ticket_number,
            entity = %entity.label,
            worklists = series.len(),
            pools = demand.len(),
            stock_racks = entity.stock_racks.len(),
            "planning pipeline completed"
        );
        Ok(PlanningOutput { series, demand })
    }

    fn aggregate(&self, request: &PlanningRequest, kind: EntityKind) -> PlanningResult<StockDemand> {
        let aggregator = match kind {
            EntityKind::Job => StockDemandAggregator::job(
                &request.preparation_layouts,
                &request.final_layouts,
                request.final_copy_count,
            ),
            EntityKind::Iso => {
                let mut layouts = request.final_layouts.values();
                let (Some(final_layout), None) = (layouts.next(), layouts.next()) else {
                    return Err(vec![PlanningError::input(format!(
                        "an ISO needs exactly one final layout, got {}",
                        request.final_layouts.len()
                    ))]);
                };
                StockDemandAggregator::iso(&request.preparation_layouts, final_layout, request.final_copy_count)
            }
        };
        aggregator.with_final_marker(self.plan.final_plate.as_str()).run()
    }
}

fn stage<T>(stage: Stage, run: impl FnOnce() -> PlanningResult<T>) -> PlanningResult<T> {
    run().inspect_err(|errors| warn!(stage = %stage, errors = errors.len(), "planning pipeline aborted"))
}
