//! Executed transfers and worklists.
//!
//! An executed record states that a planned transfer or worklist was
//! actually carried out on specific racks, by whom and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::RackPosition;
use super::transfer::{PlannedTransfer, TransferType};
use crate::error::PlanningError;

/// Physical side of an executed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutedDetail {
    /// Liquid added from a reservoir.
    Dilution {
        target_rack: String,
        target_position: RackPosition,
        reservoir_specs: String,
    },
    /// Container to container.
    Transfer {
        source_rack: String,
        source_position: RackPosition,
        target_rack: String,
        target_position: RackPosition,
    },
    /// Whole rack sector to rack sector.
    RackTransfer {
        source_rack: String,
        target_rack: String,
    },
}

impl ExecutedDetail {
    pub fn transfer_type(&self) -> TransferType {
        match self {
            Self::Dilution { .. } => TransferType::Dilution,
            Self::Transfer { .. } => TransferType::Transfer,
            Self::RackTransfer { .. } => TransferType::RackTransfer,
        }
    }

    /// Barcode of the rack receiving liquid.
    pub fn target_rack(&self) -> &str {
        match self {
            Self::Dilution { target_rack, .. }
            | Self::Transfer { target_rack, .. }
            | Self::RackTransfer { target_rack, .. } => target_rack,
        }
    }
}

/// A planned transfer that has been carried out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTransfer {
    planned: PlannedTransfer,
    detail: ExecutedDetail,
    pub user: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutedTransfer {
    /// Records an execution. The detail must match the planned variant.
    pub fn new(
        planned: PlannedTransfer,
        detail: ExecutedDetail,
        user: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PlanningError> {
        if planned.transfer_type() != detail.transfer_type() {
            return Err(PlanningError::input(format!(
                "invalid planned transfer type {} for executed {} transfer",
                planned.transfer_type(),
                detail.transfer_type()
            )));
        }
        Ok(Self {
            planned,
            detail,
            user: user.into(),
            timestamp,
        })
    }

    /// Records an execution stamped with the current time.
    pub fn now(
        planned: PlannedTransfer,
        detail: ExecutedDetail,
        user: impl Into<String>,
    ) -> Result<Self, PlanningError> {
        Self::new(planned, detail, user, Utc::now())
    }

    pub fn planned(&self) -> &PlannedTransfer {
        &self.planned
    }

    pub fn detail(&self) -> &ExecutedDetail {
        &self.detail
    }

    pub fn transfer_type(&self) -> TransferType {
        self.detail.transfer_type()
    }
}

/// A planned worklist that has been carried out. All transfers share the
/// transfer type of the planned worklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExecutedWorklist")]
pub struct ExecutedWorklist {
    /// Label of the planned worklist.
    pub planned_worklist: String,
    transfer_type: TransferType,
    transfers: Vec<ExecutedTransfer>,
}

#[derive(Deserialize)]
struct RawExecutedWorklist {
    planned_worklist: String,
    transfer_type: TransferType,
    transfers: Vec<ExecutedTransfer>,
}

impl TryFrom<RawExecutedWorklist> for ExecutedWorklist {
    type Error = PlanningError;

    fn try_from(raw: RawExecutedWorklist) -> Result<Self, Self::Error> {
        let mut worklist = Self::new(raw.planned_worklist, raw.transfer_type);
        for transfer in raw.transfers {
            worklist.add_transfer(transfer)?;
        }
        Ok(worklist)
    }
}

impl ExecutedWorklist {
    pub fn new(planned_worklist: impl Into<String>, transfer_type: TransferType) -> Self {
        Self {
            planned_worklist: planned_worklist.into(),
            transfer_type,
            transfers: Vec::new(),
        }
    }

    /// Adds a transfer of the worklist's transfer type.
    pub fn add_transfer(&mut self, transfer: ExecutedTransfer) -> Result<(), PlanningError> {
        if transfer.transfer_type() != self.transfer_type {
            return Err(PlanningError::input(format!(
                "executed worklist {} holds {} transfers, got {}",
                self.planned_worklist,
                self.transfer_type,
                transfer.transfer_type()
            )));
        }
        self.transfers.push(transfer);
        Ok(())
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn transfers(&self) -> &[ExecutedTransfer] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
