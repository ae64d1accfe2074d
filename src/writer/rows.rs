//! Robot file rows and their CSV rendering.

use crate::error::PlanningError;
use crate::models::volume::format_ul;
use crate::models::{RackPosition, TransferType};

const DILUTION_HEADER: [&str; 5] = ["SOURCE_RACK", "TARGET_RACK", "TARGET_POSITION", "VOLUME", "DILUENT"];
const TRANSFER_HEADER: [&str; 5] = ["SOURCE_RACK", "SOURCE_POSITION", "TARGET_RACK", "TARGET_POSITION", "VOLUME"];

/// One validated robot step.
#[derive(Debug, Clone, PartialEq)]
pub struct WorklistRow {
    /// Index of the planned transfer within its worklist.
    pub transfer_index: usize,
    /// Source rack barcode, or the reservoir name for dilutions.
    pub source_rack: String,
    pub source_position: Option<RackPosition>,
    pub target_rack: String,
    pub target_position: RackPosition,
    pub volume_ul: f64,
    pub diluent_info: Option<String>,
}

impl WorklistRow {
    fn record(&self, transfer_type: TransferType) -> Vec<String> {
        let volume = format_ul(self.volume_ul);
        match transfer_type {
            TransferType::Dilution => vec![
                self.source_rack.clone(),
                self.target_rack.clone(),
                self.target_position.label(),
                volume,
                self.diluent_info.clone().unwrap_or_default(),
            ],
            TransferType::Transfer | TransferType::RackTransfer => vec![
                self.source_rack.clone(),
                self.source_position.map(|p| p.label()).unwrap_or_default(),
                self.target_rack.clone(),
                self.target_position.label(),
                volume,
            ],
        }
    }
}

/// Renders rows as CSV with the header of the worklist type.
pub fn render_csv(transfer_type: TransferType, rows: &[WorklistRow]) -> Result<String, PlanningError> {
    let render_error = |e: &dyn std::fmt::Display| PlanningError::input(format!("cannot render worklist: {e}"));

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let header = match transfer_type {
        TransferType::Dilution => DILUTION_HEADER,
        TransferType::Transfer | TransferType::RackTransfer => TRANSFER_HEADER,
    };
    writer.write_record(header).map_err(|e| render_error(&e))?;
    for row in rows {
        writer
            .write_record(row.record(transfer_type))
            .map_err(|e| render_error(&e))?;
    }
    let bytes = writer.into_inner().map_err(|e| render_error(&e))?;
    String::from_utf8(bytes).map_err(|e| render_error(&e))
}
