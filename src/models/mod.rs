//! Liquid handling domain models.
//!
//! Provides the data types for planned and executed pipetting work and
//! for the physical racks it runs on. Planning-level types (transfers,
//! worklists, layouts) never refer to physical barcodes; rack-level types
//! carry the live volumes the writer validates against.
//!
//! # Domain Mappings
//!
//! | u-worklist | Lab term | Robot file |
//! |------------|----------|------------|
//! | PlannedTransfer | Pipetting step | Row |
//! | PlannedWorklist | Worklist | File |
//! | WorklistSeries | Processing order | File sequence |
//! | PlateLayout | ISO/job plate layout | |
//! | Rack | Plate or tube rack | Source/target rack |

mod executed;
mod layout;
mod pipetting;
mod position;
mod rack;
mod transfer;
mod worklist;

pub mod volume;

pub use executed::{ExecutedDetail, ExecutedTransfer, ExecutedWorklist};
pub use layout::{MoleculeDesignPool, PlateLayout, PlatePosition, PoolId, PositionType, TransferTarget};
pub use pipetting::{DefaultMethods, PipettingSpecs, PipettingSpecsRegistry, ReservoirSpecs};
pub use position::{RackPosition, RackShape, SectorTranslator};
pub use rack::{Container, ContainerSpecs, Rack, RackKind, RackLookup};
pub use transfer::{PlannedTransfer, TransferCatalog, TransferDetail, TransferKey, TransferType};
pub use worklist::{PlannedWorklist, WorklistSeries};
