//! Selection-driven text transformation core for the Kefi note editor:
//! operation catalog, selection tracking, the execute/splice/re-anchor
//! protocol, dictation capture with placeholder substitution, and toolbar
//! placement.

pub mod audio;
pub mod capture;
pub mod config;
mod error;
pub mod executor;
pub mod input;
pub mod metrics;
pub mod network;
pub mod operations;
pub mod permissions;
pub mod placement;
pub mod selection;
mod state;
mod utils;

use tracing_subscriber::EnvFilter;

pub use capture::{AudioInput, CaptureError, CaptureSession, CaptureStream, RecordingState};
pub use config::CoreSettings;
pub use error::AppError;
pub use executor::{ExecutionOutcome, OperationExecutor};
pub use input::{DocumentHost, MemoryDocument};
pub use operations::{Catalog, OperationError, OperationOptions, build_catalog};
pub use selection::{OperationStatus, Selection, SelectionState, Visibility};
pub use state::{CoreState, SelectionView};

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_logging() -> Result<(), AppError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}
