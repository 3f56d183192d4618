use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in `-v` count order.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts either a level name or its `-v` count, so `SNPTX_LOG_LEVEL=debug`
/// and `-vvv` mean the same thing.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|raw: &str| -> Result<u8, String> {
        let raw = raw.trim();
        if let Ok(count) = raw.parse::<u8>() {
            return (usize::from(count) <= LEVELS.len())
                .then_some(count)
                .ok_or_else(|| format!("verbosity count {count} is out of range"));
        }
        LEVELS
            .iter()
            .position(|name| name.eq_ignore_ascii_case(raw))
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("unknown log level '{raw}'"))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Increase verbosity (-v warn .. -vvvv trace); default: error")
            .env("SNPTX_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
