//! Stock tube demand and stock rack assignment.
//!
//! # Modules
//!
//! - **`container`**: Per-pool stock demand and picked tubes
//! - **`demand`**: Demand aggregation over ISO and job layouts
//! - **`layout`**: Stock rack layouts
//! - **`assigner`**: Stock rack assignment and stock transfer worklists

mod assigner;
mod container;
mod demand;
mod layout;

pub use assigner::{StockRack, StockRackAssigner, StockRackEntity};
pub use container::{StockTubeContainer, TubeCandidate, STOCK_DEAD_VOLUME_UL};
pub use demand::{reference_final_layout, StockDemand, StockDemandAggregator};
pub use layout::{StockRackLayout, StockRackPosition};
