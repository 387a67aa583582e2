#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod data;
pub mod impute;
pub mod outliers;
pub mod store;
pub mod transform;
pub mod types;

#[path = "../reduce/mod.rs"]
pub mod reduce;

pub use config::PipelineConfig;
pub use data::{RawTable, load_raw_table};
pub use store::{DatasetQuery, FormatPolicy, PanelError, PanelStore, PanelView, RankedVariables};
pub use transform::TransformCode;
pub use types::{ColumnSpec, Dataset, Panel};
