//! A ready-made logger for shells embedding the board.

use std::fmt::Display;

use colored::Colorize;
use log::{Level, LevelFilter};

/// External crates only get to log warnings and errors, whatever the
/// local floor is set to.
const EXTERNAL_FLOOR: Level = Level::Warn;

/// Installs the logger at the default [LevelFilter::Info] floor.
pub fn init_logger() {
    init_logger_with(LevelFilter::Info)
}

/// Installs the logger with a custom floor for the quorum crates.
pub fn init_logger_with(local: LevelFilter) {
    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::of(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^5} {}",
                level_badge(record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(move |meta| {
            let floor = if Target::of(meta.target()).is_local() {
                local
            } else {
                EXTERNAL_FLOOR.to_level_filter()
            };

            meta.level() <= floor
        })
        .chain(std::io::stdout())
        .apply()
        .expect("logging is initialized")
}

enum Target {
    External(String),
    Board,
    Impls,
    Core,
}

impl Target {
    fn of(target: &str) -> Self {
        let crate_name = target.split("::").next().unwrap_or(target);

        match crate_name {
            "quorum_core" => Self::Core,
            "quorum_impls" => Self::Impls,
            "quorum_board" => Self::Board,
            other => Self::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Board => "BOARD".bright_green(),
            Target::Impls => "IMPLS".bright_purple(),
            Target::Core => "CORE".blue(),
        };

        Display::fmt(&result, f)
    }
}

fn level_badge(level: Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        // Only reachable when a shell raises the floor past info.
        Level::Debug | Level::Trace => " DBG ".white().on_black().to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn targets_classify_by_crate() {
        assert!(Target::of("quorum_board::rooms").is_local());
        assert!(Target::of("quorum_core").is_local());
        assert!(Target::of("quorum_impls::stores").is_local());
        assert!(!Target::of("hyper::proto").is_local());
        assert!(!Target::of("").is_local());
    }
}
