//! Worklist planning for ISOs and ISO jobs.
//!
//! # Modules
//!
//! - **`plan`**: The plan handed over by the layout planner
//! - **`labels`**: Plate role markers and worklist labels
//! - **`series`**: Worklist series generation

pub mod labels;
mod plan;
mod series;

pub use plan::{EntityKind, IsoPlan, LeveledSchedule};
pub use series::{SeriesPair, WorklistSeriesGenerator};
