use tracing::Level;

/// Installs the global fmt subscriber. Logs go to stderr, stdout may carry card lines.
pub fn init(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
