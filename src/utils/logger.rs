use chrono::Local;
use eyre::Result;
use fern::Dispatch;
use log::LevelFilter;

/// Sets up the application logger with console output.
///
/// # Arguments
/// * `level` - Lowest level that is printed
///
/// # Errors
/// * If a logger is already installed
pub fn setup_logger(level: LevelFilter) -> Result<()> {
    Dispatch::new()
        .level(level)
        // HTTP internals are noisy at debug
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stdout())
        // Format log messages with time, level and module
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                message
            ));
        })
        .apply()?;
    Ok(())
}
