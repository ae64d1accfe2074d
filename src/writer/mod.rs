//! Worklist writing: volume validation, robot rows and execution.
//!
//! # Modules
//!
//! - **`validator`**: Volume checks of a worklist against real racks
//! - **`rows`**: Robot rows and CSV rendering
//! - **`executor`**: Applies validated worklists to rack state

mod executor;
mod rows;
mod validator;

pub use executor::{ExecutionSource, WorklistExecutor};
pub use rows::{render_csv, WorklistRow};
pub use validator::{TransferSource, WorklistWriter};
