//! Worklist planning for laboratory liquid-handling robots.
//!
//! Turns the plate layouts of an ISO (a set of plates to prepare) and its
//! ISO job into ordered robot worklists, aggregates the stock tube demand,
//! assigns stock racks and checks worklists against the real volumes of
//! physical racks before robot rows are written.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `PlannedTransfer`, `PlannedWorklist`,
//!   `WorklistSeries`, `PlateLayout`, `Rack`, `PipettingSpecs`, executed records
//! - **`planning`**: The `IsoPlan` and worklist series generation
//! - **`stock`**: Stock demand aggregation and stock rack assignment
//! - **`writer`**: Volume validation, robot rows (CSV) and execution
//! - **`validation`**: Input integrity checks for plans
//! - **`pipeline`**: Runs the planning stages in order
//! - **`config`**: Pipetting method configuration (TOML)
//! - **`error`**: Error kinds and aggregated stage results
//!
//! # Volumes
//!
//! Volumes are stored in liters. Constructors of transfers and layout
//! positions accept either unit: values up to 1 are liters, larger values
//! microliters. Robot rows and messages use microliters.
//!
//! # Logging
//!
//! Stages emit `tracing` events; the crate installs no subscriber.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod planning;
pub mod stock;
pub mod validation;
pub mod writer;
