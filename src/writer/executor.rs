//! Worklist execution.
//!
//! Runs the volume check and, if it passes, updates the container volumes
//! of the racks involved and records who executed which transfer.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::info;

use super::rows::WorklistRow;
use super::validator::{TransferSource, WorklistWriter};
use crate::error::{PlanningError, PlanningResult};
use crate::models::{
    ExecutedDetail, ExecutedTransfer, ExecutedWorklist, PipettingSpecs, PlannedWorklist, Rack, RackPosition,
    ReservoirSpecs,
};

/// Source side of an execution.
#[derive(Debug)]
pub enum ExecutionSource<'a> {
    Reservoir(&'a ReservoirSpecs),
    Rack(&'a mut Rack),
    /// Source and target are the same rack.
    TargetRack,
}

/// Executes planned worklists against rack state.
#[derive(Debug, Clone)]
pub struct WorklistExecutor<'a> {
    worklist: &'a PlannedWorklist,
    specs: &'a PipettingSpecs,
    user: String,
    ignored_positions: BTreeSet<RackPosition>,
}

impl<'a> WorklistExecutor<'a> {
    pub fn new(worklist: &'a PlannedWorklist, specs: &'a PipettingSpecs, user: impl Into<String>) -> Self {
        Self {
            worklist,
            specs,
            user: user.into(),
            ignored_positions: BTreeSet::new(),
        }
    }

    pub fn with_ignored_positions(mut self, positions: impl IntoIterator<Item = RackPosition>) -> Self {
        self.ignored_positions.extend(positions);
        self
    }

    /// Validates and applies the worklist. Racks are only modified if the
    /// volume check passes.
    pub fn execute(
        &self,
        target: &mut Rack,
        mut source: ExecutionSource<'_>,
        timestamp: DateTime<Utc>,
    ) -> PlanningResult<ExecutedWorklist> {
        let rows = {
            let transfer_source = match &source {
                ExecutionSource::Reservoir(specs) => TransferSource::Reservoir(*specs),
                ExecutionSource::Rack(rack) => TransferSource::Rack(&**rack),
                ExecutionSource::TargetRack => TransferSource::Rack(&*target),
            };
            WorklistWriter::new(self.worklist, &*target, transfer_source, self.specs)
                .with_ignored_positions(self.ignored_positions.iter().copied())
                .run()?
        };

        for row in &rows {
            let target_volume = current_volume(target, &row.target_position);
            target.set_volume_ul(&row.target_position, target_volume + row.volume_ul);
            if let Some(position) = row.source_position {
                let rack: &mut Rack = match &mut source {
                    ExecutionSource::Rack(rack) => &mut **rack,
                    ExecutionSource::TargetRack => &mut *target,
                    ExecutionSource::Reservoir(_) => continue,
                };
                let source_volume = current_volume(rack, &position);
                rack.set_volume_ul(&position, source_volume - row.volume_ul);
            }
        }

        let executed = self.record(&rows, timestamp).map_err(|e| vec![e])?;
        info!(
            worklist = self.worklist.label(),
            user = %self.user,
            rows = rows.len(),
            transfers = executed.len(),
            "worklist executed"
        );
        Ok(executed)
    }

    /// One executed transfer per planned transfer that produced rows.
    fn record(&self, rows: &[WorklistRow], timestamp: DateTime<Utc>) -> Result<ExecutedWorklist, PlanningError> {
        let mut executed = ExecutedWorklist::new(self.worklist.label(), self.worklist.transfer_type());
        let mut seen = BTreeSet::new();
        for row in rows {
            if !seen.insert(row.transfer_index) {
                continue;
            }
            let Some(planned) = self.worklist.transfers().get(row.transfer_index) else {
                continue;
            };
            let detail = match (&row.diluent_info, row.source_position) {
                (Some(_), _) => ExecutedDetail::Dilution {
                    target_rack: row.target_rack.clone(),
                    target_position: row.target_position,
                    reservoir_specs: row.source_rack.clone(),
                },
                (None, Some(source_position)) if planned.source_position().is_some() => ExecutedDetail::Transfer {
                    source_rack: row.source_rack.clone(),
                    source_position,
                    target_rack: row.target_rack.clone(),
                    target_position: row.target_position,
                },
                (None, _) => ExecutedDetail::RackTransfer {
                    source_rack: row.source_rack.clone(),
                    target_rack: row.target_rack.clone(),
                },
            };
            executed.add_transfer(ExecutedTransfer::new(planned.clone(), detail, self.user.clone(), timestamp)?)?;
        }
        Ok(executed)
    }
}

fn current_volume(rack: &Rack, position: &RackPosition) -> f64 {
    rack.container(position).map(|c| c.volume_ul()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerSpecs, PlannedTransfer, RackShape, TransferType};
    use chrono::TimeZone;

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    fn plate(barcode: &str) -> Rack {
        Rack::plate(barcode, RackShape::SHAPE_96, ContainerSpecs::new(100.0, 5.0))
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_execute_transfers() {
        let mut source = plate("02000002");
        source.set_volume_ul(&pos("A1"), 50.0);
        let mut target = plate("02000001");
        let specs = PipettingSpecs::new("BioMek", 1.5, 250.0);
        let worklist = PlannedWorklist::new(
            "123_02_p1_to_a",
            TransferType::Transfer,
            "BioMek",
            vec![
                PlannedTransfer::transfer(10.0, pos("A1"), pos("B1")),
                PlannedTransfer::transfer(15.0, pos("A1"), pos("C1")),
            ],
        )
        .unwrap();

        let executed = WorklistExecutor::new(&worklist, &specs, "it")
            .execute(&mut target, ExecutionSource::Rack(&mut source), timestamp())
            .unwrap();

        assert_eq!(executed.planned_worklist, "123_02_p1_to_a");
        assert_eq!(executed.len(), 2);
        assert_eq!(executed.transfers()[1].user, "it");
        assert_eq!(executed.transfers()[1].timestamp, timestamp());
        assert!((source.container(&pos("A1")).unwrap().volume_ul() - 25.0).abs() < 1e-9);
        assert!((target.container(&pos("C1")).unwrap().volume_ul() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_check_leaves_racks_untouched() {
        let mut target = plate("02000001");
        target.set_volume_ul(&pos("A1"), 60.0);
        let before = target.clone();
        let specs = PipettingSpecs::new("BioMek", 1.5, 250.0);
        let reservoir = ReservoirSpecs::new("quarter", 100000.0, 5000.0, 10000.0);
        let worklist = PlannedWorklist::new(
            "123_01_a",
            TransferType::Dilution,
            "BioMek",
            vec![
                PlannedTransfer::dilution(20.0, "buffer", pos("B1")),
                PlannedTransfer::dilution(50.0, "buffer", pos("A1")),
            ],
        )
        .unwrap();

        let errors = WorklistExecutor::new(&worklist, &specs, "it")
            .execute(&mut target, ExecutionSource::Reservoir(&reservoir), timestamp())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(target, before);
    }

    #[test]
    fn test_rack_transfer_records_one_transfer() {
        let mut plate = plate("02000001");
        plate.set_volume_ul(&pos("A1"), 30.0);
        plate.set_volume_ul(&pos("A2"), 30.0);
        let mut copy = Rack::plate("02000003", RackShape::SHAPE_96, ContainerSpecs::new(100.0, 5.0));
        let specs = PipettingSpecs::new("CyBio", 1.5, 50.0).sector_bound();
        let worklist = PlannedWorklist::new(
            "123_03_a_to_a",
            TransferType::RackTransfer,
            "CyBio",
            vec![PlannedTransfer::one_to_one(5.0)],
        )
        .unwrap();

        let executed = WorklistExecutor::new(&worklist, &specs, "it")
            .execute(&mut copy, ExecutionSource::Rack(&mut plate), timestamp())
            .unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed.transfers()[0].detail(),
            &ExecutedDetail::RackTransfer {
                source_rack: "02000001".into(),
                target_rack: "02000003".into(),
            }
        );
        assert!((copy.container(&pos("A2")).unwrap().volume_ul() - 5.0).abs() < 1e-9);
        assert!((plate.container(&pos("A2")).unwrap().volume_ul() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_intraplate_execution() {
        let mut plate = plate("02000001");
        plate.set_volume_ul(&pos("A1"), 30.0);
        let specs = PipettingSpecs::new("BioMek", 1.5, 250.0);
        let worklist = PlannedWorklist::new(
            "123_04_p1_to_p1",
            TransferType::Transfer,
            "BioMek",
            vec![PlannedTransfer::transfer(10.0, pos("A1"), pos("A2"))],
        )
        .unwrap();

        WorklistExecutor::new(&worklist, &specs, "it")
            .execute(&mut plate, ExecutionSource::TargetRack, timestamp())
            .unwrap();
        assert!((plate.container(&pos("A1")).unwrap().volume_ul() - 20.0).abs() < 1e-9);
        assert!((plate.container(&pos("A2")).unwrap().volume_ul() - 10.0).abs() < 1e-9);
    }
}
