//! Volume validation of a planned worklist against real racks.
//!
//! The writer walks the transfers of a worklist in order and tracks the
//! volume of every container it touches. A transfer is rejected when
//!
//! 1. its volume is below the minimum transfer volume of the method,
//! 2. it is a position transfer above the maximum transfer volume,
//! 3. the target container is missing or would overflow,
//! 4. it is a position transfer into a filled container that exceeds the
//!    maximum dilution factor of the method,
//! 5. the source container is missing or would drop below its dead volume.
//!
//! Rejected transfers leave the trackers untouched. Rejections are
//! collected per category; any rejection fails the whole worklist.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::rows::WorklistRow;
use crate::error::{joined, PlanningError, PlanningResult};
use crate::models::volume::{format_ul, is_larger_than, is_smaller_than, liters_to_ul, trimmed_ul};
use crate::models::{
    Container, PipettingSpecs, PlannedWorklist, Rack, RackPosition, ReservoirSpecs, SectorTranslator,
    TransferDetail, TransferType,
};

/// Where the liquid of a worklist comes from.
#[derive(Debug, Clone, Copy)]
pub enum TransferSource<'a> {
    /// A buffer reservoir; unlimited.
    Reservoir(&'a ReservoirSpecs),
    /// A rack with tracked containers. May be the target rack itself.
    Rack(&'a Rack),
}

impl<'a> TransferSource<'a> {
    /// Label written into the source rack column.
    fn name(&self) -> &'a str {
        match *self {
            Self::Reservoir(specs) => &specs.name,
            Self::Rack(rack) => &rack.barcode,
        }
    }
}

/// One position-level movement of a planned transfer.
struct Step {
    transfer_index: usize,
    source_position: Option<RackPosition>,
    target_position: RackPosition,
    volume_ul: f64,
    diluent_info: Option<String>,
}

#[derive(Default)]
struct Rejections {
    too_small: Vec<String>,
    too_large: Vec<String>,
    source_too_small: BTreeSet<String>,
    source_missing: BTreeSet<String>,
    target_overflow: Vec<String>,
    target_missing: BTreeSet<String>,
    dilution_factor: Vec<String>,
}

impl Rejections {
    fn into_errors(self, specs: &PipettingSpecs) -> Vec<PlanningError> {
        let min = trimmed_ul(liters_to_ul(specs.min_transfer_volume));
        let max = trimmed_ul(liters_to_ul(specs.max_transfer_volume));
        let factor = specs.max_dilution_factor;
        let categories = [
            (
                format!("some transfer volumes are smaller than the allowed minimum of {min} µl"),
                self.too_small,
            ),
            (
                format!("some transfer volumes are larger than the allowed maximum of {max} µl"),
                self.too_large,
            ),
            (
                "some source containers do not contain enough volume to provide liquid for all targets".to_string(),
                self.source_too_small.into_iter().collect(),
            ),
            (
                "could not find containers for the following source positions".to_string(),
                self.source_missing.into_iter().collect(),
            ),
            (
                "some target containers cannot take up the transfer volume".to_string(),
                self.target_overflow,
            ),
            (
                "could not find containers for the following target positions".to_string(),
                self.target_missing.into_iter().collect(),
            ),
            (
                format!("some transfers exceed the maximum dilution factor of {factor}"),
                self.dilution_factor,
            ),
        ];
        categories
            .into_iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(head, items)| PlanningError::volume(format!("{head}: {}", joined(items))))
            .collect()
    }
}

/// Validates one planned worklist and produces its robot rows.
#[derive(Debug, Clone)]
pub struct WorklistWriter<'a> {
    worklist: &'a PlannedWorklist,
    target_rack: &'a Rack,
    source: TransferSource<'a>,
    specs: &'a PipettingSpecs,
    ignored_positions: BTreeSet<RackPosition>,
}

impl<'a> WorklistWriter<'a> {
    pub fn new(
        worklist: &'a PlannedWorklist,
        target_rack: &'a Rack,
        source: TransferSource<'a>,
        specs: &'a PipettingSpecs,
    ) -> Self {
        Self {
            worklist,
            target_rack,
            source,
            specs,
            ignored_positions: BTreeSet::new(),
        }
    }

    /// Positions to skip: targets for dilutions, sources otherwise.
    pub fn with_ignored_positions(mut self, positions: impl IntoIterator<Item = RackPosition>) -> Self {
        self.ignored_positions.extend(positions);
        self
    }

    /// Validates the worklist. Returns all rows, or every rejection.
    pub fn run(&self) -> PlanningResult<Vec<WorklistRow>> {
        info!(
            worklist = self.worklist.label(),
            target = %self.target_rack.barcode,
            transfers = self.worklist.len(),
            "validating worklist volumes"
        );
        let steps = self.steps().map_err(|e| vec![e])?;

        // (rack barcode, position) -> current volume (µl)
        let mut volumes: BTreeMap<(&str, RackPosition), f64> = BTreeMap::new();
        let mut rejections = Rejections::default();
        let mut rows = Vec::with_capacity(steps.len());
        for step in steps {
            if self.accept(&step, &mut volumes, &mut rejections) {
                rows.push(WorklistRow {
                    transfer_index: step.transfer_index,
                    source_rack: self.source.name().to_string(),
                    source_position: step.source_position,
                    target_rack: self.target_rack.barcode.clone(),
                    target_position: step.target_position,
                    volume_ul: step.volume_ul,
                    diluent_info: step.diluent_info,
                });
            }
        }

        let errors = rejections.into_errors(self.specs);
        if !errors.is_empty() {
            warn!(worklist = self.worklist.label(), errors = errors.len(), "worklist volume check failed");
            return Err(errors);
        }
        debug!(worklist = self.worklist.label(), rows = rows.len(), "worklist volume check passed");
        Ok(rows)
    }

    /// Expands the planned transfers into position steps.
    fn steps(&self) -> Result<Vec<Step>, PlanningError> {
        let source_rack = match (self.worklist.transfer_type(), self.source) {
            (TransferType::Dilution, TransferSource::Reservoir(_)) => None,
            (TransferType::Transfer | TransferType::RackTransfer, TransferSource::Rack(rack)) => Some(rack),
            (transfer_type, _) => {
                return Err(PlanningError::input(format!(
                    "worklist {} of type {transfer_type} cannot be written with this source",
                    self.worklist.label()
                )))
            }
        };

        let mut steps = Vec::new();
        for (transfer_index, transfer) in self.worklist.iter().enumerate() {
            let volume_ul = transfer.volume_ul();
            match transfer.detail() {
                TransferDetail::Dilution {
                    target_position,
                    diluent_info,
                } => {
                    if self.ignored_positions.contains(target_position) {
                        continue;
                    }
                    steps.push(Step {
                        transfer_index,
                        source_position: None,
                        target_position: *target_position,
                        volume_ul,
                        diluent_info: Some(diluent_info.clone()),
                    });
                }
                TransferDetail::Transfer {
                    source_position,
                    target_position,
                } => {
                    if self.ignored_positions.contains(source_position) {
                        continue;
                    }
                    steps.push(Step {
                        transfer_index,
                        source_position: Some(*source_position),
                        target_position: *target_position,
                        volume_ul,
                        diluent_info: None,
                    });
                }
                TransferDetail::RackTransfer {
                    sector_count,
                    source_sector,
                    target_sector,
                } => {
                    let Some(source_rack) = source_rack else { continue };
                    let translator = SectorTranslator::new(
                        source_rack.shape,
                        self.target_rack.shape,
                        *sector_count,
                        *source_sector,
                        *target_sector,
                    )?;
                    // only filled source containers take part
                    for source_position in translator.source_positions() {
                        let filled = source_rack
                            .container(&source_position)
                            .is_some_and(|c| c.sample_volume.is_some());
                        if !filled || self.ignored_positions.contains(&source_position) {
                            continue;
                        }
                        steps.push(Step {
                            transfer_index,
                            source_position: Some(source_position),
                            target_position: translator.translate(source_position),
                            volume_ul,
                            diluent_info: None,
                        });
                    }
                }
            }
        }
        Ok(steps)
    }

    fn container(&self, barcode: &str, position: &RackPosition) -> Option<&'a Container> {
        if barcode == self.target_rack.barcode {
            return self.target_rack.container(position);
        }
        match self.source {
            TransferSource::Rack(rack) if rack.barcode == barcode => rack.container(position),
            _ => None,
        }
    }

    fn accept<'v>(
        &'v self,
        step: &Step,
        volumes: &mut BTreeMap<(&'v str, RackPosition), f64>,
        rejections: &mut Rejections,
    ) -> bool {
        let volume = step.volume_ul;
        let target = step.target_position;
        if is_smaller_than(volume, liters_to_ul(self.specs.min_transfer_volume)) {
            rejections.too_small.push(format!("target {target} ({} µl)", format_ul(volume)));
            return false;
        }
        if self.worklist.transfer_type() == TransferType::Transfer
            && is_larger_than(volume, liters_to_ul(self.specs.max_transfer_volume))
        {
            let source = step.source_position.map(|p| p.label()).unwrap_or_default();
            rejections.too_large.push(format!("source {source} ({} µl)", format_ul(volume)));
            return false;
        }

        let target_key = (self.target_rack.barcode.as_str(), target);
        let Some(target_container) = self.container(target_key.0, &target) else {
            rejections.target_missing.insert(target.label());
            return false;
        };
        let target_volume = volumes
            .get(&target_key)
            .copied()
            .unwrap_or_else(|| target_container.volume_ul());
        if is_larger_than(target_volume + volume, liters_to_ul(target_container.specs.max_volume)) {
            rejections.target_overflow.push(format!(
                "{target} (sample vol: {}, transfer vol: {})",
                format_ul(target_volume),
                format_ul(volume)
            ));
            return false;
        }
        if self.worklist.transfer_type() == TransferType::Transfer && target_volume > 0.0 {
            let factor = (target_volume + volume) / volume;
            if is_larger_than(factor, self.specs.max_dilution_factor) {
                rejections
                    .dilution_factor
                    .push(format!("target {target} (factor {factor:.1})"));
                return false;
            }
        }

        let source_update = match (self.source, step.source_position) {
            (TransferSource::Rack(rack), Some(source)) => {
                let source_key = (rack.barcode.as_str(), source);
                let Some(source_container) = self.container(source_key.0, &source) else {
                    rejections.source_missing.insert(source.label());
                    return false;
                };
                let current = volumes
                    .get(&source_key)
                    .copied()
                    .unwrap_or_else(|| source_container.volume_ul());
                let remaining = current - volume;
                if is_smaller_than(remaining, liters_to_ul(source_container.specs.dead_volume)) {
                    rejections.source_too_small.insert(source.label());
                    return false;
                }
                Some((source_key, current))
            }
            _ => None,
        };

        volumes.insert(target_key, target_volume + volume);
        if let Some((key, current)) = source_update {
            // re-read: source and target may be the same container
            let base = volumes.get(&key).copied().unwrap_or(current);
            volumes.insert(key, base - volume);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{ContainerSpecs, PlannedTransfer, RackShape};

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    fn plate(barcode: &str, max_ul: f64, dead_ul: f64) -> Rack {
        Rack::plate(barcode, RackShape::SHAPE_96, ContainerSpecs::new(max_ul, dead_ul))
    }

    fn biomek() -> PipettingSpecs {
        PipettingSpecs::new("BioMek", 1.5, 250.0)
    }

    fn reservoir() -> ReservoirSpecs {
        ReservoirSpecs::new("quarter", 100000.0, 5000.0, 10000.0)
    }

    fn dilutions(volumes: &[(f64, &str)]) -> PlannedWorklist {
        let transfers = volumes
            .iter()
            .map(|(v, p)| PlannedTransfer::dilution(*v, "buffer", pos(p)))
            .collect();
        PlannedWorklist::new("123_01_a", TransferType::Dilution, "BioMek", transfers).unwrap()
    }

    fn transfers(volumes: &[(f64, &str, &str)]) -> PlannedWorklist {
        let transfers = volumes
            .iter()
            .map(|(v, s, t)| PlannedTransfer::transfer(*v, pos(s), pos(t)))
            .collect();
        PlannedWorklist::new("123_02_p1_to_a", TransferType::Transfer, "BioMek", transfers).unwrap()
    }

    #[test]
    fn test_target_overflow_keeps_tracked_volume() {
        let target = plate("02000001", 100.0, 5.0);
        let (specs, reservoir) = (biomek(), reservoir());
        let worklist = dilutions(&[(60.0, "A1"), (50.0, "A1"), (30.0, "A1")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Reservoir(&reservoir), &specs)
            .run()
            .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Volume);
        // the rejected 50 µl were not added; 30 µl still fit
        assert_eq!(
            errors[0].message(),
            "some target containers cannot take up the transfer volume: A1 (sample vol: 60.0, transfer vol: 50.0)"
        );
    }

    #[test]
    fn test_dilution_rows() {
        let mut target = plate("02000001", 100.0, 5.0);
        target.set_volume_ul(&pos("A1"), 10.0);
        let (specs, reservoir) = (biomek(), reservoir());
        let worklist = dilutions(&[(60.0, "A1"), (30.0, "A1"), (45.0, "B1")]);
        let rows = WorklistWriter::new(&worklist, &target, TransferSource::Reservoir(&reservoir), &specs)
            .run()
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].source_rack, "quarter");
        assert_eq!(rows[0].source_position, None);
        assert_eq!(rows[2].target_position, pos("B1"));
        assert_eq!(rows[2].diluent_info.as_deref(), Some("buffer"));
    }

    #[test]
    fn test_source_dead_volume() {
        let mut source = plate("02000002", 100.0, 5.0);
        source.set_volume_ul(&pos("A1"), 20.0);
        let target = plate("02000001", 100.0, 5.0);
        let specs = biomek();
        let worklist = transfers(&[(10.0, "A1", "B1"), (10.0, "A1", "C1"), (4.0, "A1", "D1")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&source), &specs)
            .run()
            .unwrap_err();

        // 20 - 10 = 10 left: the second 10 µl would hit the dead volume, 4 µl are fine
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().starts_with("some source containers do not contain enough volume"));
        assert!(errors[0].message().ends_with(": A1"));
    }

    #[test]
    fn test_transfer_volume_range() {
        let mut source = plate("02000002", 500.0, 5.0);
        source.set_volume_ul(&pos("A1"), 400.0);
        source.set_volume_ul(&pos("A2"), 400.0);
        let target = plate("02000001", 500.0, 5.0);
        let specs = biomek();
        let worklist = transfers(&[(0.000001, "A1", "B1"), (300.0, "A2", "B2")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&source), &specs)
            .run()
            .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0].message(),
            "some transfer volumes are smaller than the allowed minimum of 1.5 µl: target B1 (1.0 µl)"
        );
        assert_eq!(
            errors[1].message(),
            "some transfer volumes are larger than the allowed maximum of 250 µl: source A2 (300.0 µl)"
        );
    }

    #[test]
    fn test_missing_containers() {
        let source = Rack::tube_rack("09000001", RackShape::SHAPE_96);
        let target = Rack::tube_rack("09000002", RackShape::SHAPE_96).with_container(
            pos("A1"),
            Container::new(ContainerSpecs::new(1500.0, 5.0)).with_barcode("1001"),
        );
        let specs = biomek();
        let worklist = transfers(&[(5.0, "A1", "A1"), (5.0, "B1", "B1")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&source), &specs)
            .run()
            .unwrap_err();

        assert_eq!(errors.len(), 2);
        assert!(errors[0].message().starts_with("could not find containers for the following source"));
        assert!(errors[1].message().ends_with("target positions: B1"));
    }

    #[test]
    fn test_intraplate_transfers_share_tracker() {
        let mut plate = plate("02000001", 100.0, 5.0);
        plate.set_volume_ul(&pos("A1"), 50.0);
        let specs = biomek();
        // B1 receives 20 µl and passes them on; 20 - 20 < 5 dead volume
        let worklist = transfers(&[(20.0, "A1", "B1"), (20.0, "B1", "C1")]);
        let errors = WorklistWriter::new(&worklist, &plate, TransferSource::Rack(&plate), &specs)
            .run()
            .unwrap_err();
        assert!(errors[0].message().ends_with(": B1"));

        let worklist = transfers(&[(20.0, "A1", "B1"), (10.0, "B1", "C1")]);
        let rows = WorklistWriter::new(&worklist, &plate, TransferSource::Rack(&plate), &specs)
            .run()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_rack_transfer_expansion() {
        let mut source = plate("02000002", 100.0, 5.0);
        source.set_volume_ul(&pos("A1"), 20.0);
        source.set_volume_ul(&pos("B1"), 20.0);
        let target = Rack::plate("02000001", RackShape::SHAPE_384, ContainerSpecs::new(100.0, 5.0));
        let specs = PipettingSpecs::new("CyBio", 1.5, 50.0).sector_bound();
        let worklist = PlannedWorklist::new(
            "123_03_p1_to_a",
            TransferType::RackTransfer,
            "CyBio",
            vec![PlannedTransfer::rack_transfer(5.0, 4, 0, 1)],
        )
        .unwrap();
        let rows = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&source), &specs)
            .run()
            .unwrap();

        let pairs: Vec<(RackPosition, RackPosition)> = rows
            .iter()
            .map(|r| (r.source_position.unwrap(), r.target_position))
            .collect();
        assert_eq!(pairs, vec![(pos("A1"), pos("A2")), (pos("B1"), pos("C2"))]);
        assert!(rows.iter().all(|r| r.transfer_index == 0));
    }

    #[test]
    fn test_ignored_positions() {
        let target = plate("02000001", 100.0, 5.0);
        let (specs, reservoir) = (biomek(), reservoir());
        let worklist = dilutions(&[(60.0, "A1"), (150.0, "B1")]);
        let rows = WorklistWriter::new(&worklist, &target, TransferSource::Reservoir(&reservoir), &specs)
            .with_ignored_positions([pos("B1")])
            .run()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_position, pos("A1"));
    }

    #[test]
    fn test_source_kind_mismatch() {
        let target = plate("02000001", 100.0, 5.0);
        let specs = biomek();
        let worklist = dilutions(&[(60.0, "A1")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&target), &specs)
            .run()
            .unwrap_err();
        assert_eq!(errors[0].kind(), ErrorKind::Input);
    }

    #[test]
    fn test_preset_target_overflow() {
        let mut target = plate("02000001", 100.0, 5.0);
        target.set_volume_ul(&pos("A1"), 60.0);
        let (specs, reservoir) = (biomek(), reservoir());
        // 60 + 40 reaches the maximum exactly and is still accepted
        let worklist = dilutions(&[(50.0, "A1"), (40.0, "A1")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Reservoir(&reservoir), &specs)
            .run()
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message(),
            "some target containers cannot take up the transfer volume: A1 (sample vol: 60.0, transfer vol: 50.0)"
        );
    }

    #[test]
    fn test_dilution_factor_limit() {
        let mut source = plate("02000002", 100.0, 5.0);
        source.set_volume_ul(&pos("A1"), 50.0);
        let mut target = plate("02000001", 100.0, 5.0);
        target.set_volume_ul(&pos("B1"), 38.0);
        target.set_volume_ul(&pos("C1"), 18.0);
        let specs = biomek();
        // B1: (38 + 2) / 2 = 20, C1: (18 + 2) / 2 = 10, D1 is empty
        let worklist = transfers(&[(2.0, "A1", "B1"), (2.0, "A1", "C1"), (2.0, "A1", "D1")]);
        let errors = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&source), &specs)
            .run()
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message(),
            "some transfers exceed the maximum dilution factor of 10: target B1 (factor 20.0)"
        );

        let lenient = biomek().with_max_dilution_factor(25.0);
        let rows = WorklistWriter::new(&worklist, &target, TransferSource::Rack(&source), &lenient)
            .run()
            .unwrap();
        assert_eq!(rows.len(), 3);
    }
}
