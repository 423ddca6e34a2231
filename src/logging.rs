//! Terminal logging for the `oaih` binary.

use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Initialize the terminal logger. Safe to call once per process.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build();
    let _ = TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto);
}
