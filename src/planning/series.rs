//! Worklist series generation.
//!
//! Turns an [`IsoPlan`] into two worklist series, one for the ISO and one
//! for its job. Both series draw their indices from one shared counter, so
//! the indices of all worklists created in one run are unique and reflect
//! the global processing order.
//!
//! # Algorithm
//! 1. Order the plates ([`IsoPlan::plate_order`]).
//! 2. Buffer worklists: one dilution worklist per plate, in plate order.
//! 3. Transfer worklists, per plate in plate order:
//!    rack transfers by generation, fixed position transfers by generation,
//!    then one worklist per interplate target (targets in plate order).
//! 4. Unless the job is processed first, the fixed position transfers of
//!    the final plate are withheld in step 3 and form the last worklists
//!    (job series); they need the stock delivered by the job.
//!
//! Empty worklists are never emitted.

use tracing::{debug, info, warn};

use super::labels::create_worklist_label;
use super::plan::{EntityKind, IsoPlan};
use crate::error::{PlanningError, PlanningResult};
use crate::models::{PipettingSpecsRegistry, PlannedTransfer, PlannedWorklist, TransferType, WorklistSeries};
use crate::validation::validate_plan;

/// The ISO and job worklist series of one generator run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesPair {
    pub iso: WorklistSeries,
    pub job: WorklistSeries,
}

impl SeriesPair {
    pub fn get(&self, kind: EntityKind) -> &WorklistSeries {
        match kind {
            EntityKind::Iso => &self.iso,
            EntityKind::Job => &self.job,
        }
    }

    fn get_mut(&mut self, kind: EntityKind) -> &mut WorklistSeries {
        match kind {
            EntityKind::Iso => &mut self.iso,
            EntityKind::Job => &mut self.job,
        }
    }

    /// All worklists of both series in index order, with their series.
    pub fn merged(&self) -> Vec<(u32, EntityKind, &PlannedWorklist)> {
        let mut all: Vec<(u32, EntityKind, &PlannedWorklist)> = self
            .iso
            .members()
            .iter()
            .map(|(i, w)| (*i, EntityKind::Iso, w))
            .chain(self.job.members().iter().map(|(i, w)| (*i, EntityKind::Job, w)))
            .collect();
        all.sort_by_key(|(i, _, _)| *i);
        all
    }

    /// Total number of worklists.
    pub fn len(&self) -> usize {
        self.iso.len() + self.job.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iso.is_empty() && self.job.is_empty()
    }
}

/// Builds the worklist series for an ISO plan.
pub struct WorklistSeriesGenerator<'a> {
    plan: &'a IsoPlan,
    registry: &'a PipettingSpecsRegistry,
}

/// Mutable state of one generator run.
struct Run<'a> {
    plan: &'a IsoPlan,
    registry: &'a PipettingSpecsRegistry,
    plate_order: Vec<String>,
    counter: u32,
    series: SeriesPair,
    errors: Vec<PlanningError>,
}

impl<'a> WorklistSeriesGenerator<'a> {
    pub fn new(plan: &'a IsoPlan, registry: &'a PipettingSpecsRegistry) -> Self {
        Self { plan, registry }
    }

    /// Generates the series. Fails with all input errors found; no partial
    /// series is returned.
    pub fn run(&self) -> PlanningResult<SeriesPair> {
        let ticket = self.plan.ticket_number;
        info!(ticket, "generating worklist series");

        if let Err(errors) = validate_plan(self.plan, self.registry) {
            warn!(ticket, errors = errors.len(), "worklist series generation aborted");
            return Err(errors);
        }

        let mut run = Run {
            plan: self.plan,
            registry: self.registry,
            plate_order: self.plan.plate_order(),
            counter: 0,
            series: SeriesPair::default(),
            errors: Vec::new(),
        };
        run.create_buffer_worklists();
        run.create_transfer_worklists();

        if !run.errors.is_empty() {
            warn!(ticket, errors = run.errors.len(), "worklist series generation aborted");
            return Err(run.errors);
        }
        info!(
            ticket,
            iso = run.series.iso.len(),
            job = run.series.job.len(),
            "worklist series generation completed"
        );
        Ok(run.series)
    }
}

impl Run<'_> {
    fn create_buffer_worklists(&mut self) {
        let plan = self.plan;
        for plate in self.plate_order.clone() {
            let Some(dilutions) = plan.dilutions.get(&plate) else {
                continue;
            };
            let series = plan.series_of(&plate);
            self.create_worklist(
                &plate,
                None,
                TransferType::Dilution,
                dilutions.clone(),
                series,
            );
        }
    }

    fn create_transfer_worklists(&mut self) {
        let plan = self.plan;
        for plate in self.plate_order.clone() {
            self.create_intraplate_worklists(&plate, TransferType::RackTransfer, EntityKind::Iso);
            let withheld = plate == plan.final_plate && !plan.process_job_first;
            if !withheld {
                self.create_intraplate_worklists(&plate, TransferType::Transfer, plan.series_of(&plate));
            }
            self.create_interplate_worklists(&plate);
        }
        if !plan.process_job_first {
            let final_plate = plan.final_plate.clone();
            self.create_intraplate_worklists(&final_plate, TransferType::Transfer, EntityKind::Job);
        }
    }

    /// One worklist per generation with the transfers of one type.
    fn create_intraplate_worklists(&mut self, plate: &str, transfer_type: TransferType, series: EntityKind) {
        let plan = self.plan;
        for (_, transfers) in plan.intraplate.generations(plate) {
            let batch: Vec<PlannedTransfer> = transfers
                .iter()
                .filter(|t| t.transfer_type() == transfer_type)
                .cloned()
                .collect();
            self.create_worklist(plate, Some(plate), transfer_type, batch, series);
        }
    }

    /// One worklist per target plate, targets in plate order.
    fn create_interplate_worklists(&mut self, source: &str) {
        let plan = self.plan;
        let Some(targets) = plan.interplate.get(source) else {
            return;
        };
        let series = plan.series_of(source);
        for target in self.plate_order.clone() {
            let Some(transfers) = targets.get(&target) else {
                continue;
            };
            let Some(transfer_type) = transfers.first().map(|t| t.transfer_type()) else {
                continue;
            };
            self.create_worklist(&target, Some(source), transfer_type, transfers.clone(), series);
        }
    }

    fn create_worklist(
        &mut self,
        target: &str,
        source: Option<&str>,
        transfer_type: TransferType,
        transfers: Vec<PlannedTransfer>,
        series: EntityKind,
    ) {
        if transfers.is_empty() {
            return;
        }
        let method = match self.pipetting_method(transfer_type, target) {
            Ok(method) => method,
            Err(e) => {
                self.errors.push(e);
                return;
            }
        };
        self.counter += 1;
        let index = self.counter;
        let label = create_worklist_label(self.plan.ticket_number, index, target, source);
        let count = transfers.len();
        let result = PlannedWorklist::new(label.clone(), transfer_type, method, transfers)
            .and_then(|worklist| self.series.get_mut(series).add_worklist(index, worklist));
        match result {
            Ok(()) => debug!(label = %label, index, series = %series, transfers = count, "worklist created"),
            Err(e) => self.errors.push(e),
        }
    }

    fn pipetting_method(&self, transfer_type: TransferType, target: &str) -> Result<String, PlanningError> {
        match transfer_type {
            TransferType::RackTransfer => Ok(self.registry.sector().name.clone()),
            TransferType::Transfer => Ok(self.registry.non_sector().name.clone()),
            TransferType::Dilution => self
                .plan
                .dilution_methods
                .get(target)
                .cloned()
                .ok_or_else(|| PlanningError::input(format!("no dilution pipetting method for plate {target:?}"))),
        }
    }
}
