//! The ISO plan consumed by the worklist series generator.
//!
//! The plan is produced by an external planner. It names the plates taking
//! part in the processing (by marker), and holds the planned transfers
//! grouped by the plate they are executed on.
//!
//! # Leveled schedule
//! Intraplate transfers depend on each other: a transfer may only start
//! once its source position has been filled by another transfer on the
//! same plate. The dependency depth of a transfer is its *generation*.
//! [`LeveledSchedule`] keeps one batch per (plate, generation) and yields
//! the batches of a plate in ascending generation order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::labels::ROLE_FINAL;
use crate::models::PlannedTransfer;

/// The entity a worklist or stock rack belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A single ISO.
    Iso,
    /// The ISO job shared by several ISOs.
    Job,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iso => f.write_str("ISO"),
            Self::Job => f.write_str("ISO job"),
        }
    }
}

/// One serialized level of a [`LeveledSchedule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScheduleLevel {
    plate: String,
    generation: u32,
    transfers: Vec<PlannedTransfer>,
}

/// Intraplate transfer batches by (plate, generation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ScheduleLevel>", into = "Vec<ScheduleLevel>")]
pub struct LeveledSchedule {
    levels: BTreeMap<(String, u32), Vec<PlannedTransfer>>,
}

impl LeveledSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a transfer to the batch of `plate` at `generation`.
    pub fn add(&mut self, plate: impl Into<String>, generation: u32, transfer: PlannedTransfer) {
        self.levels
            .entry((plate.into(), generation))
            .or_default()
            .push(transfer);
    }

    /// Batches of a plate in ascending generation order.
    pub fn generations<'a>(
        &'a self,
        plate: &'a str,
    ) -> impl Iterator<Item = (u32, &'a [PlannedTransfer])> + 'a {
        self.levels
            .iter()
            .filter(move |((p, _), _)| p == plate)
            .map(|((_, g), transfers)| (*g, transfers.as_slice()))
    }

    /// Plates with at least one batch, sorted.
    pub fn plates(&self) -> BTreeSet<&str> {
        self.levels.keys().map(|(p, _)| p.as_str()).collect()
    }

    /// All batches with their plate and generation.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32, &[PlannedTransfer])> {
        self.levels
            .iter()
            .map(|((p, g), transfers)| (p.as_str(), *g, transfers.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl From<Vec<ScheduleLevel>> for LeveledSchedule {
    fn from(levels: Vec<ScheduleLevel>) -> Self {
        let mut schedule = Self::new();
        for level in levels {
            for transfer in level.transfers {
                schedule.add(level.plate.clone(), level.generation, transfer);
            }
        }
        schedule
    }
}

impl From<LeveledSchedule> for Vec<ScheduleLevel> {
    fn from(schedule: LeveledSchedule) -> Self {
        schedule
            .levels
            .into_iter()
            .map(|((plate, generation), transfers)| ScheduleLevel {
                plate,
                generation,
                transfers,
            })
            .collect()
    }
}

fn default_final_plate() -> String {
    ROLE_FINAL.to_string()
}

/// The worklist plan for one ISO (and its job).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsoPlan {
    /// Ticket number, part of every worklist label.
    pub ticket_number: u32,
    /// Marker of the final plate.
    #[serde(default = "default_final_plate")]
    pub final_plate: String,
    /// ISO preparation plate markers.
    #[serde(default)]
    pub preparation_plates: BTreeSet<String>,
    /// Job preparation plate markers.
    #[serde(default)]
    pub job_plates: BTreeSet<String>,
    /// Dilutions by target plate marker.
    #[serde(default)]
    pub dilutions: BTreeMap<String, Vec<PlannedTransfer>>,
    /// Transfers within a plate.
    #[serde(default)]
    pub intraplate: LeveledSchedule,
    /// Transfers between plates, by source and target plate marker.
    #[serde(default)]
    pub interplate: BTreeMap<String, BTreeMap<String, Vec<PlannedTransfer>>>,
    /// Whether job plates are processed before the ISO plates.
    #[serde(default)]
    pub process_job_first: bool,
    /// Pipetting method for the dilutions of each plate.
    #[serde(default)]
    pub dilution_methods: BTreeMap<String, String>,
}

impl IsoPlan {
    /// Creates an empty plan with the default final plate marker.
    pub fn new(ticket_number: u32) -> Self {
        Self {
            ticket_number,
            final_plate: default_final_plate(),
            preparation_plates: BTreeSet::new(),
            job_plates: BTreeSet::new(),
            dilutions: BTreeMap::new(),
            intraplate: LeveledSchedule::new(),
            interplate: BTreeMap::new(),
            process_job_first: false,
            dilution_methods: BTreeMap::new(),
        }
    }

    pub fn with_preparation_plate(mut self, marker: impl Into<String>) -> Self {
        self.preparation_plates.insert(marker.into());
        self
    }

    pub fn with_job_plate(mut self, marker: impl Into<String>) -> Self {
        self.job_plates.insert(marker.into());
        self
    }

    pub fn with_process_job_first(mut self, process_job_first: bool) -> Self {
        self.process_job_first = process_job_first;
        self
    }

    pub fn with_dilution_method(mut self, plate: impl Into<String>, method: impl Into<String>) -> Self {
        self.dilution_methods.insert(plate.into(), method.into());
        self
    }

    pub fn add_dilution(&mut self, plate: impl Into<String>, transfer: PlannedTransfer) {
        self.dilutions.entry(plate.into()).or_default().push(transfer);
    }

    pub fn add_intraplate(&mut self, plate: impl Into<String>, generation: u32, transfer: PlannedTransfer) {
        self.intraplate.add(plate, generation, transfer);
    }

    pub fn add_interplate(
        &mut self,
        source_plate: impl Into<String>,
        target_plate: impl Into<String>,
        transfer: PlannedTransfer,
    ) {
        self.interplate
            .entry(source_plate.into())
            .or_default()
            .entry(target_plate.into())
            .or_default()
            .push(transfer);
    }

    /// Plate markers in processing order.
    ///
    /// Job first: job plates, preparation plates, final plate. Otherwise:
    /// preparation plates, final plate, job plates. Plates of one role are
    /// sorted by marker.
    pub fn plate_order(&self) -> Vec<String> {
        let prep = self.preparation_plates.iter().cloned();
        let job = self.job_plates.iter().cloned();
        let last = std::iter::once(self.final_plate.clone());
        if self.process_job_first {
            job.chain(prep).chain(last).collect()
        } else {
            prep.chain(last).chain(job).collect()
        }
    }

    /// The series a plate's worklists belong to. The final plate belongs
    /// to the ISO.
    pub fn series_of(&self, plate: &str) -> EntityKind {
        if self.job_plates.contains(plate) {
            EntityKind::Job
        } else {
            EntityKind::Iso
        }
    }

    /// Whether the marker names a plate of this plan.
    pub fn contains_plate(&self, plate: &str) -> bool {
        plate == self.final_plate
            || self.preparation_plates.contains(plate)
            || self.job_plates.contains(plate)
    }
}
