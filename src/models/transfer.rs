//! Planned liquid transfers.
//!
//! A planned transfer is a single aspirate-dispense step described in
//! abstract terms (volume and positions), independent of any physical rack.
//! Three variants exist:
//!
//! | Variant | Payload | Source |
//! |---------|---------|--------|
//! | Dilution | target position, diluent info | anonymous reservoir |
//! | Transfer | source and target position | a rack position |
//! | RackTransfer | sector count, source and target sector | a whole rack sector |
//!
//! # Identity
//! Two transfers are the same entity when their [`TransferKey`]s are
//! equal. The key holds the canonical volume in nanoliters plus the
//! variant's identifying fields, so a volume given as `5` (µl) and as
//! `0.000005` (l) yields one key. [`TransferCatalog`] uses the key to
//! deduplicate transfers before creating new ones.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::position::RackPosition;
use super::volume::{canonical_nl, liters_to_ul, trimmed_ul, volume_in_liters};

/// Transfer variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransferType {
    /// Volume added from a reservoir (buffer).
    Dilution,
    /// Position-to-position sample transfer.
    Transfer,
    /// Sector-to-sector rack transfer.
    RackTransfer,
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dilution => "SAMPLE_DILUTION",
            Self::Transfer => "SAMPLE_TRANSFER",
            Self::RackTransfer => "RACK_SAMPLE_TRANSFER",
        };
        f.write_str(name)
    }
}

/// Variant payload of a planned transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferDetail {
    Dilution {
        target_position: RackPosition,
        diluent_info: String,
    },
    Transfer {
        source_position: RackPosition,
        target_position: RackPosition,
    },
    RackTransfer {
        sector_count: u8,
        source_sector: u8,
        target_sector: u8,
    },
}

/// Structural identity of a planned transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransferKey {
    Dilution {
        volume_nl: u64,
        diluent_info: String,
        target_position: RackPosition,
    },
    Transfer {
        volume_nl: u64,
        source_position: RackPosition,
        target_position: RackPosition,
    },
    RackTransfer {
        volume_nl: u64,
        sector_count: u8,
        source_sector: u8,
        target_sector: u8,
    },
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // volume in µl first, fields joined by ';'
        match self {
            Self::Dilution {
                volume_nl,
                diluent_info,
                target_position,
            } => write!(
                f,
                "{};{};{}",
                trimmed_ul(*volume_nl as f64 / 1000.0),
                diluent_info,
                target_position
            ),
            Self::Transfer {
                volume_nl,
                source_position,
                target_position,
            } => write!(
                f,
                "{};{};{}",
                trimmed_ul(*volume_nl as f64 / 1000.0),
                source_position,
                target_position
            ),
            Self::RackTransfer {
                volume_nl,
                sector_count,
                source_sector,
                target_sector,
            } => write!(
                f,
                "{};{};{};{}",
                trimmed_ul(*volume_nl as f64 / 1000.0),
                sector_count,
                source_sector,
                target_sector
            ),
        }
    }
}

/// A planned liquid transfer.
///
/// Equality and hashing use [`TransferKey`] only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTransfer {
    /// Volume in liters.
    volume: f64,
    detail: TransferDetail,
}

impl PlannedTransfer {
    /// Creates a dilution. `volume` follows the input unit convention.
    pub fn dilution(
        volume: f64,
        diluent_info: impl Into<String>,
        target_position: RackPosition,
    ) -> Self {
        Self {
            volume: volume_in_liters(volume),
            detail: TransferDetail::Dilution {
                target_position,
                diluent_info: diluent_info.into(),
            },
        }
    }

    /// Creates a position-to-position transfer. `volume` follows the input
    /// unit convention.
    pub fn transfer(volume: f64, source_position: RackPosition, target_position: RackPosition) -> Self {
        Self {
            volume: volume_in_liters(volume),
            detail: TransferDetail::Transfer {
                source_position,
                target_position,
            },
        }
    }

    /// Creates a rack sector transfer. `volume` follows the input unit
    /// convention.
    pub fn rack_transfer(volume: f64, sector_count: u8, source_sector: u8, target_sector: u8) -> Self {
        Self {
            volume: volume_in_liters(volume),
            detail: TransferDetail::RackTransfer {
                sector_count,
                source_sector,
                target_sector,
            },
        }
    }

    /// Creates a replicating rack transfer (one sector, 0 to 0).
    pub fn one_to_one(volume: f64) -> Self {
        Self::rack_transfer(volume, 1, 0, 0)
    }

    /// Volume in liters.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Volume in microliters.
    pub fn volume_ul(&self) -> f64 {
        liters_to_ul(self.volume)
    }

    pub fn detail(&self) -> &TransferDetail {
        &self.detail
    }

    pub fn transfer_type(&self) -> TransferType {
        match self.detail {
            TransferDetail::Dilution { .. } => TransferType::Dilution,
            TransferDetail::Transfer { .. } => TransferType::Transfer,
            TransferDetail::RackTransfer { .. } => TransferType::RackTransfer,
        }
    }

    /// Target position (not defined for rack transfers).
    pub fn target_position(&self) -> Option<RackPosition> {
        match &self.detail {
            TransferDetail::Dilution {
                target_position, ..
            }
            | TransferDetail::Transfer {
                target_position, ..
            } => Some(*target_position),
            TransferDetail::RackTransfer { .. } => None,
        }
    }

    /// Source position (only defined for position transfers).
    pub fn source_position(&self) -> Option<RackPosition> {
        match &self.detail {
            TransferDetail::Transfer {
                source_position, ..
            } => Some(*source_position),
            _ => None,
        }
    }

    /// The identity key.
    pub fn key(&self) -> TransferKey {
        let volume_nl = canonical_nl(self.volume);
        match &self.detail {
            TransferDetail::Dilution {
                target_position,
                diluent_info,
            } => TransferKey::Dilution {
                volume_nl,
                diluent_info: diluent_info.clone(),
                target_position: *target_position,
            },
            TransferDetail::Transfer {
                source_position,
                target_position,
            } => TransferKey::Transfer {
                volume_nl,
                source_position: *source_position,
                target_position: *target_position,
            },
            TransferDetail::RackTransfer {
                sector_count,
                source_sector,
                target_sector,
            } => TransferKey::RackTransfer {
                volume_nl,
                sector_count: *sector_count,
                source_sector: *source_sector,
                target_sector: *target_sector,
            },
        }
    }
}

impl PartialEq for PlannedTransfer {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PlannedTransfer {}

impl Hash for PlannedTransfer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for PlannedTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key().fmt(f)
    }
}

/// Deduplicating store of planned transfers.
///
/// Returns the existing transfer when one with the same key was created
/// before, so equal transfers are shared across worklists.
#[derive(Debug, Clone, Default)]
pub struct TransferCatalog {
    transfers: HashMap<TransferKey, PlannedTransfer>,
}

impl TransferCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the catalog entry for `transfer`, inserting it if new.
    pub fn get_or_insert(&mut self, transfer: PlannedTransfer) -> PlannedTransfer {
        self.transfers
            .entry(transfer.key())
            .or_insert(transfer)
            .clone()
    }

    pub fn dilution(
        &mut self,
        volume: f64,
        diluent_info: impl Into<String>,
        target_position: RackPosition,
    ) -> PlannedTransfer {
        self.get_or_insert(PlannedTransfer::dilution(volume, diluent_info, target_position))
    }

    pub fn transfer(
        &mut self,
        volume: f64,
        source_position: RackPosition,
        target_position: RackPosition,
    ) -> PlannedTransfer {
        self.get_or_insert(PlannedTransfer::transfer(volume, source_position, target_position))
    }

    pub fn rack_transfer(
        &mut self,
        volume: f64,
        sector_count: u8,
        source_sector: u8,
        target_sector: u8,
    ) -> PlannedTransfer {
        self.get_or_insert(PlannedTransfer::rack_transfer(
            volume,
            sector_count,
            source_sector,
            target_sector,
        ))
    }

    /// Looks up a transfer by key.
    pub fn get(&self, key: &TransferKey) -> Option<&PlannedTransfer> {
        self.transfers.get(key)
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
