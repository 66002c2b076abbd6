use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Loads `.env.local` then `.env`, and installs the stderr subscriber
/// filtered by `LOG_LEVEL` (default INFO).
pub fn init() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();
}

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();
}

pub fn args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// First bare argument, skipping the value that follows any flag in
/// `valued_flags`.
pub fn positional_arg(args: &[String], valued_flags: &[&str]) -> Option<PathBuf> {
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        if valued_flags.contains(&arg.as_str()) {
            idx += 2;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(PathBuf::from(arg));
        }
        idx += 1;
    }
    None
}

/// Accepts both `--name value` and `--name=value`.
pub fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn parse_usize_arg(args: &[String], name: &str) -> Option<usize> {
    parse_str_arg(args, name).and_then(|v| v.parse::<usize>().ok())
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

pub fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_skips_flag_values() {
        let args = argv(&["--model", "raw", "--json", "events.json"]);
        assert_eq!(
            positional_arg(&args, &["--model"]),
            Some(PathBuf::from("events.json"))
        );
        assert_eq!(
            positional_arg(
                &argv(&["--top-k", "5", "--model=raw"]),
                &["--top-k", "--model"]
            ),
            None
        );
    }

    #[test]
    fn valued_flags_accept_both_forms() {
        let args = argv(&["--top-k", "5", "--model=raw"]);
        assert_eq!(parse_usize_arg(&args, "--top-k"), Some(5));
        assert_eq!(parse_str_arg(&args, "--model").as_deref(), Some("raw"));
        assert_eq!(parse_str_arg(&args, "--live"), None);
        assert_eq!(
            parse_usize_arg(&argv(&["--top-k", "many"]), "--top-k"),
            None
        );
    }

    #[test]
    fn flags_match_exactly() {
        let args = argv(&["--json", "--live=false"]);
        assert!(has_flag(&args, "--json"));
        assert!(!has_flag(&args, "--live"));
    }
}
