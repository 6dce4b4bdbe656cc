//! Terminal front end for ragpipe
//!
//! Logging setup, component wiring from configuration, and the small set of
//! terminal helpers used by the `ragpipe` binary.

pub mod bootstrap;
pub mod logging;
mod ui;


pub use bootstrap::{
    ConfigOverrides, build_components, build_pipeline, load_config, redacted_settings,
};
pub use ui::{
    display_banner, format_indexing_result, format_sources, handle_input_with_history,
    print_error, print_help, print_indexing_result, print_sources,
};

// Re-export core types
pub use ragpipe_core::{Error, Result};
