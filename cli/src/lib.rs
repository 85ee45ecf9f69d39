//! Library side of the `optiform` binary: settings resolution, dataset and
//! result files, and the batch summary table.

pub mod dataset;
pub mod error;
pub mod offline;
pub mod report;
pub mod settings;

pub use dataset::{load_tasks, read_results, select_pending, ResultRecord, ResultWriter, Task};
pub use error::CliError;
pub use report::{render_table, summarize, DatasetSummary};
pub use settings::{
    build_collaborators, resolve_search_config, ModelSettings, SearchOverrides, SimilarityKind,
};
