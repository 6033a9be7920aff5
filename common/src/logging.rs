use std::env;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Maps a `RUST_LOG`-style value to a level; anything unrecognised is INFO.
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

pub fn init_logger() {
    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let level = parse_level(&env_filter);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    // A second call (tests, embedding) keeps the first subscriber.
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level(" debug "), Level::DEBUG);
        assert_eq!(parse_level("trace"), Level::TRACE);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }
}
