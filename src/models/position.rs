//! Rack positions, shapes and sector geometry.
//!
//! Positions are zero-based (row, column) pairs with the familiar `A1`
//! label form (rows as letters, columns 1-based). Sectors partition a
//! rack into interleaved 2x2 quadrants: sector 0 = even row / even column,
//! 1 = even row / odd column, 2 = odd row / even column, 3 = odd / odd.
//!
//! # Sector Translation
//!
//! | Source | Target | Mapping |
//! |--------|--------|---------|
//! | 96 | 384 | whole source rack → one target sector |
//! | 384 | 96 | one source sector → whole target rack |
//! | same shape | same shape | source sector → target sector |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlanningError;

/// A position within a rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RackPosition {
    /// Zero-based row index.
    pub row: u16,
    /// Zero-based column index.
    pub column: u16,
}

impl RackPosition {
    /// Creates a position from zero-based indices.
    pub fn new(row: u16, column: u16) -> Self {
        Self { row, column }
    }

    /// Parses an `A1`-style label.
    pub fn from_label(label: &str) -> Result<Self, PlanningError> {
        let label = label.trim();
        let split = label
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| PlanningError::input(format!("invalid rack position label {label:?}")))?;
        let (letters, digits) = label.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PlanningError::input(format!(
                "invalid rack position label {label:?}"
            )));
        }
        let invalid = || PlanningError::input(format!("invalid rack position label {label:?}"));
        let mut row: u32 = 0;
        for c in letters.to_ascii_uppercase().chars() {
            row = row
                .checked_mul(26)
                .and_then(|r| r.checked_add(c as u32 - 'A' as u32 + 1))
                .ok_or_else(invalid)?;
        }
        let column: u32 = digits
            .parse()
            .map_err(|_| PlanningError::input(format!("invalid rack position label {label:?}")))?;
        if column == 0 || row > u16::MAX as u32 || column > u16::MAX as u32 {
            return Err(PlanningError::input(format!(
                "invalid rack position label {label:?}"
            )));
        }
        Ok(Self::new((row - 1) as u16, (column - 1) as u16))
    }

    /// The `A1`-style label.
    pub fn label(&self) -> String {
        let mut letters = Vec::new();
        let mut n = self.row as u32 + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let row: String = letters.into_iter().rev().collect();
        format!("{row}{}", self.column + 1)
    }

    /// Index of the 2x2 sector this position falls into.
    pub fn sector_index(&self) -> u8 {
        ((self.row % 2) * 2 + self.column % 2) as u8
    }
}

impl fmt::Display for RackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for RackPosition {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

impl TryFrom<String> for RackPosition {
    type Error = PlanningError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value)
    }
}

impl From<RackPosition> for String {
    fn from(value: RackPosition) -> Self {
        value.label()
    }
}

/// Rack dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RackShape {
    pub rows: u16,
    pub columns: u16,
}

impl RackShape {
    /// 8 x 12 rack.
    pub const SHAPE_96: RackShape = RackShape { rows: 8, columns: 12 };
    /// 16 x 24 rack.
    pub const SHAPE_384: RackShape = RackShape {
        rows: 16,
        columns: 24,
    };

    pub fn new(rows: u16, columns: u16) -> Self {
        Self { rows, columns }
    }

    /// Number of positions.
    pub fn size(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Whether the position lies within this shape.
    pub fn contains(&self, position: &RackPosition) -> bool {
        position.row < self.rows && position.column < self.columns
    }

    /// All positions, column-wise (A1, B1, ..., A2, ...).
    pub fn positions_by_column(&self) -> Vec<RackPosition> {
        let mut positions = Vec::with_capacity(self.size());
        for column in 0..self.columns {
            for row in 0..self.rows {
                positions.push(RackPosition::new(row, column));
            }
        }
        positions
    }

    /// Positions of one sector, row-wise. One sector = whole rack.
    pub fn sector_positions(&self, sector_count: u8, sector_index: u8) -> Vec<RackPosition> {
        let mut positions = Vec::new();
        for row in 0..self.rows {
            for column in 0..self.columns {
                let pos = RackPosition::new(row, column);
                if sector_count == 1 || pos.sector_index() == sector_index {
                    positions.push(pos);
                }
            }
        }
        positions
    }
}

impl fmt::Display for RackShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.columns)
    }
}

/// How a sector transfer maps source onto target positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectorMapping {
    /// Same shapes, one position per position.
    OneToOne,
    /// Sector to sector within racks of the same shape.
    SameShape,
    /// Small source rack fills one sector of a large target.
    ManyToOne,
    /// One sector of a large source fills a small target.
    OneToMany,
}

/// Translates positions for a rack sector transfer.
#[derive(Debug, Clone)]
pub struct SectorTranslator {
    source_shape: RackShape,
    source_sector: u8,
    target_sector: u8,
    mapping: SectorMapping,
}

impl SectorTranslator {
    /// Creates a translator. Only 1 and 4 sector layouts are supported.
    pub fn new(
        source_shape: RackShape,
        target_shape: RackShape,
        sector_count: u8,
        source_sector: u8,
        target_sector: u8,
    ) -> Result<Self, PlanningError> {
        let mapping = match sector_count {
            1 if source_shape == target_shape => SectorMapping::OneToOne,
            4 if source_sector > 3 || target_sector > 3 => {
                return Err(PlanningError::input(format!(
                    "sector index out of range for 4 sectors: {source_sector} -> {target_sector}"
                )))
            }
            4 if source_shape == target_shape => SectorMapping::SameShape,
            4 if source_shape.rows * 2 == target_shape.rows
                && source_shape.columns * 2 == target_shape.columns =>
            {
                SectorMapping::ManyToOne
            }
            4 if source_shape.rows == target_shape.rows * 2
                && source_shape.columns == target_shape.columns * 2 =>
            {
                SectorMapping::OneToMany
            }
            _ => {
                return Err(PlanningError::input(format!(
                    "unsupported sector transfer: {sector_count} sector(s) from {source_shape} to {target_shape}"
                )))
            }
        };
        Ok(Self {
            source_shape,
            source_sector,
            target_sector,
            mapping,
        })
    }

    /// Source positions taking part in the transfer.
    pub fn source_positions(&self) -> Vec<RackPosition> {
        match self.mapping {
            SectorMapping::OneToOne | SectorMapping::ManyToOne => {
                self.source_shape.sector_positions(1, 0)
            }
            SectorMapping::SameShape | SectorMapping::OneToMany => {
                self.source_shape.sector_positions(4, self.source_sector)
            }
        }
    }

    /// Target position for a source position.
    pub fn translate(&self, source: RackPosition) -> RackPosition {
        let (t_row, t_col) = (self.target_sector as u16 / 2, self.target_sector as u16 % 2);
        match self.mapping {
            SectorMapping::OneToOne => source,
            SectorMapping::SameShape => {
                RackPosition::new((source.row / 2) * 2 + t_row, (source.column / 2) * 2 + t_col)
            }
            SectorMapping::ManyToOne => {
                RackPosition::new(source.row * 2 + t_row, source.column * 2 + t_col)
            }
            SectorMapping::OneToMany => RackPosition::new(source.row / 2, source.column / 2),
        }
    }
}
