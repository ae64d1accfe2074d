//! Planned worklists and worklist series.
//!
//! A planned worklist is an unordered batch of transfers that share one
//! [`TransferType`]; it is the unit a robot file is generated for. A
//! worklist series orders worklists by an explicit integer index.

use serde::{Deserialize, Serialize};

use super::transfer::{PlannedTransfer, TransferType};
use crate::error::PlanningError;

/// A batch of planned transfers of a single type.
///
/// The type homogeneity is checked on construction and on every insert,
/// so a mixed worklist cannot exist. Deserialization goes through
/// [`PlannedWorklist::new`] as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPlannedWorklist")]
pub struct PlannedWorklist {
    label: String,
    transfer_type: TransferType,
    pipetting_method: String,
    transfers: Vec<PlannedTransfer>,
}

#[derive(Deserialize)]
struct RawPlannedWorklist {
    label: String,
    transfer_type: TransferType,
    pipetting_method: String,
    transfers: Vec<PlannedTransfer>,
}

impl TryFrom<RawPlannedWorklist> for PlannedWorklist {
    type Error = PlanningError;

    fn try_from(raw: RawPlannedWorklist) -> Result<Self, Self::Error> {
        Self::new(raw.label, raw.transfer_type, raw.pipetting_method, raw.transfers)
    }
}

impl PlannedWorklist {
    /// Creates a worklist. Fails if any transfer has a different type.
    pub fn new(
        label: impl Into<String>,
        transfer_type: TransferType,
        pipetting_method: impl Into<String>,
        transfers: Vec<PlannedTransfer>,
    ) -> Result<Self, PlanningError> {
        let label = label.into();
        let mismatching: Vec<String> = transfers
            .iter()
            .filter(|t| t.transfer_type() != transfer_type)
            .map(|t| format!("{} ({})", t, t.transfer_type()))
            .collect();
        if !mismatching.is_empty() {
            return Err(PlanningError::input(format!(
                "worklist {label:?} accepts only {transfer_type} transfers, got: {}",
                mismatching.join(", ")
            )));
        }
        Ok(Self {
            label,
            transfer_type,
            pipetting_method: pipetting_method.into(),
            transfers,
        })
    }

    /// Creates a worklist typed after its first transfer.
    pub fn from_transfers(
        label: impl Into<String>,
        pipetting_method: impl Into<String>,
        transfers: Vec<PlannedTransfer>,
    ) -> Result<Self, PlanningError> {
        let label = label.into();
        let transfer_type = transfers
            .first()
            .map(|t| t.transfer_type())
            .ok_or_else(|| PlanningError::input(format!("worklist {label:?} has no transfers")))?;
        Self::new(label, transfer_type, pipetting_method, transfers)
    }

    /// Adds a transfer of the worklist's type.
    pub fn add_transfer(&mut self, transfer: PlannedTransfer) -> Result<(), PlanningError> {
        if transfer.transfer_type() != self.transfer_type {
            return Err(PlanningError::input(format!(
                "worklist {:?} accepts only {} transfers, got {}",
                self.label,
                self.transfer_type,
                transfer.transfer_type()
            )));
        }
        self.transfers.push(transfer);
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    /// Name of the pipetting method (robot specs) used for this worklist.
    pub fn pipetting_method(&self) -> &str {
        &self.pipetting_method
    }

    pub fn transfers(&self) -> &[PlannedTransfer] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlannedTransfer> {
        self.transfers.iter()
    }
}

impl<'a> IntoIterator for &'a PlannedWorklist {
    type Item = &'a PlannedTransfer;
    type IntoIter = std::slice::Iter<'a, PlannedTransfer>;

    fn into_iter(self) -> Self::IntoIter {
        self.transfers.iter()
    }
}

/// An ordered series of planned worklists.
///
/// Each member carries an explicit index. Indices are unique within a
/// series; members are kept sorted by index, also after deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorklistSeries")]
pub struct WorklistSeries {
    members: Vec<(u32, PlannedWorklist)>,
}

#[derive(Deserialize)]
struct RawWorklistSeries {
    members: Vec<(u32, PlannedWorklist)>,
}

impl TryFrom<RawWorklistSeries> for WorklistSeries {
    type Error = PlanningError;

    fn try_from(raw: RawWorklistSeries) -> Result<Self, Self::Error> {
        let mut series = Self::new();
        for (index, worklist) in raw.members {
            series.add_worklist(index, worklist)?;
        }
        Ok(series)
    }
}

impl WorklistSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worklist at `index`. Fails if the index is taken.
    pub fn add_worklist(&mut self, index: u32, worklist: PlannedWorklist) -> Result<(), PlanningError> {
        match self.members.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(_) => Err(PlanningError::input(format!(
                "worklist series already has a worklist at index {index}"
            ))),
            Err(pos) => {
                self.members.insert(pos, (index, worklist));
                Ok(())
            }
        }
    }

    /// Returns the worklist at `index`.
    pub fn get_worklist_for_index(&self, index: u32) -> Result<&PlannedWorklist, PlanningError> {
        self.members
            .binary_search_by_key(&index, |(i, _)| *i)
            .map(|pos| &self.members[pos].1)
            .map_err(|_| PlanningError::input(format!("there is no worklist for index {index}")))
    }

    /// Worklists in index order.
    pub fn sorted_worklists(&self) -> impl Iterator<Item = &PlannedWorklist> {
        self.members.iter().map(|(_, w)| w)
    }

    /// (index, worklist) pairs in index order.
    pub fn members(&self) -> &[(u32, PlannedWorklist)] {
        &self.members
    }

    /// All indices, ascending.
    pub fn indices(&self) -> Vec<u32> {
        self.members.iter().map(|(i, _)| *i).collect()
    }

    /// Next free index after the highest one (0 for an empty series).
    pub fn next_index(&self) -> u32 {
        self.members.last().map(|(i, _)| i + 1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RackPosition;

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    fn transfer_worklist(label: &str) -> PlannedWorklist {
        PlannedWorklist::new(
            label,
            TransferType::Transfer,
            "BioMek",
            vec![PlannedTransfer::transfer(5.0, pos("A1"), pos("A2"))],
        )
        .unwrap()
    }

    #[test]
    fn test_worklist_rejects_mixed_types() {
        let result = PlannedWorklist::new(
            "mixed",
            TransferType::Transfer,
            "BioMek",
            vec![
                PlannedTransfer::transfer(5.0, pos("A1"), pos("A2")),
                PlannedTransfer::dilution(5.0, "buffer", pos("A2")),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_add_transfer_keeps_homogeneity() {
        let mut wl = transfer_worklist("wl");
        assert!(wl
            .add_transfer(PlannedTransfer::dilution(5.0, "buffer", pos("A2")))
            .is_err());
        assert!(wl
            .add_transfer(PlannedTransfer::transfer(3.0, pos("A1"), pos("A3")))
            .is_ok());
        assert_eq!(wl.len(), 2);
        assert!(wl.iter().all(|t| t.transfer_type() == wl.transfer_type()));
    }

    #[test]
    fn test_from_transfers() {
        let wl = PlannedWorklist::from_transfers(
            "buffer",
            "BioMek",
            vec![PlannedTransfer::dilution(5.0, "buffer", pos("A2"))],
        )
        .unwrap();
        assert_eq!(wl.transfer_type(), TransferType::Dilution);
        assert!(PlannedWorklist::from_transfers("empty", "BioMek", vec![]).is_err());
    }

    #[test]
    fn test_series_sorted_by_index() {
        let mut series = WorklistSeries::new();
        series.add_worklist(3, transfer_worklist("c")).unwrap();
        series.add_worklist(1, transfer_worklist("a")).unwrap();
        series.add_worklist(2, transfer_worklist("b")).unwrap();

        let labels: Vec<&str> = series.sorted_worklists().map(|w| w.label()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert_eq!(series.indices(), vec![1, 2, 3]);
        assert_eq!(series.next_index(), 4);
    }

    #[test]
    fn test_series_unique_indices() {
        let mut series = WorklistSeries::new();
        series.add_worklist(1, transfer_worklist("a")).unwrap();
        assert!(series.add_worklist(1, transfer_worklist("b")).is_err());
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_series_point_lookup() {
        let mut series = WorklistSeries::new();
        series.add_worklist(7, transfer_worklist("x")).unwrap();
        assert_eq!(series.get_worklist_for_index(7).unwrap().label(), "x");
        assert!(series.get_worklist_for_index(8).is_err());
    }

    #[test]
    fn test_deserialized_worklist_stays_homogeneous() {
        let mut value = serde_json::to_value(transfer_worklist("wl")).unwrap();
        let dilution = serde_json::to_value(PlannedTransfer::dilution(5.0, "buffer", pos("B1"))).unwrap();
        value["transfers"].as_array_mut().unwrap().push(dilution);
        assert!(serde_json::from_value::<PlannedWorklist>(value).is_err());

        let value = serde_json::to_value(transfer_worklist("wl")).unwrap();
        let wl: PlannedWorklist = serde_json::from_value(value).unwrap();
        assert_eq!(wl, transfer_worklist("wl"));
    }

    #[test]
    fn test_deserialized_series_is_sorted_and_unique() {
        let mut series = WorklistSeries::new();
        series.add_worklist(1, transfer_worklist("a")).unwrap();
        series.add_worklist(2, transfer_worklist("b")).unwrap();
        let mut value = serde_json::to_value(&series).unwrap();
        value["members"].as_array_mut().unwrap().reverse();

        let restored: WorklistSeries = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(restored.get_worklist_for_index(2).unwrap().label(), "b");
        assert_eq!(restored.indices(), vec![1, 2]);

        let first = value["members"][0].clone();
        value["members"].as_array_mut().unwrap().push(first);
        assert!(serde_json::from_value::<WorklistSeries>(value).is_err());
    }
}
