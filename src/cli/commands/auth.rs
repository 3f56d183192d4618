use clap::{Arg, ArgMatches, Command};
use std::{num::NonZeroUsize, time::Duration};

use crate::auth::HashParams;

pub const ARG_ARGON2_MEMORY: &str = "argon2-memory-kib";
pub const ARG_ARGON2_ITERATIONS: &str = "argon2-iterations";
pub const ARG_ARGON2_PARALLELISM: &str = "argon2-parallelism";
pub const ARG_ARGON2_SALT_LENGTH: &str = "argon2-salt-length";
pub const ARG_ARGON2_KEY_LENGTH: &str = "argon2-key-length";
pub const ARG_HASH_CONCURRENCY: &str = "hash-concurrency";
pub const ARG_CLAIMS_TTL: &str = "claims-ttl-seconds";
pub const ARG_STORE_TIMEOUT: &str = "store-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_argon2_args(command);
    command
        .arg(
            Arg::new(ARG_HASH_CONCURRENCY)
                .long(ARG_HASH_CONCURRENCY)
                .help("Maximum concurrent password hash operations (default: available CPUs)")
                .env("SNPTX_HASH_CONCURRENCY")
                .global(true)
                .value_parser(clap::value_parser!(NonZeroUsize)),
        )
        .arg(
            Arg::new(ARG_CLAIMS_TTL)
                .long(ARG_CLAIMS_TTL)
                .help("Lifetime of claims issued at login, in seconds")
                .env("SNPTX_CLAIMS_TTL_SECONDS")
                .global(true)
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT)
                .long(ARG_STORE_TIMEOUT)
                .help("Deadline for a single credential or session store operation, in seconds")
                .env("SNPTX_STORE_TIMEOUT_SECONDS")
                .global(true)
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

// Parallelism is encoded in every stored hash; existing hashes keep
// verifying with the parameters they were created with.
fn with_argon2_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ARGON2_MEMORY)
                .long(ARG_ARGON2_MEMORY)
                .help("Argon2id memory cost in KiB")
                .env("SNPTX_ARGON2_MEMORY_KIB")
                .global(true)
                .default_value("131072")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_ITERATIONS)
                .long(ARG_ARGON2_ITERATIONS)
                .help("Argon2id time cost (passes over memory)")
                .env("SNPTX_ARGON2_ITERATIONS")
                .global(true)
                .default_value("4")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_PARALLELISM)
                .long(ARG_ARGON2_PARALLELISM)
                .help("Argon2id lanes")
                .env("SNPTX_ARGON2_PARALLELISM")
                .global(true)
                .default_value("4")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_SALT_LENGTH)
                .long(ARG_ARGON2_SALT_LENGTH)
                .help("Random salt length in bytes")
                .env("SNPTX_ARGON2_SALT_LENGTH")
                .global(true)
                .default_value("16")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_ARGON2_KEY_LENGTH)
                .long(ARG_ARGON2_KEY_LENGTH)
                .help("Derived key length in bytes")
                .env("SNPTX_ARGON2_KEY_LENGTH")
                .global(true)
                .default_value("32")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub hash_params: HashParams,
    pub hash_concurrency: Option<NonZeroUsize>,
    pub claims_ttl_seconds: i64,
    pub store_timeout: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let defaults = HashParams::default();
        let hash_params = HashParams::default()
            .with_memory_kib(
                matches
                    .get_one::<u32>(ARG_ARGON2_MEMORY)
                    .copied()
                    .unwrap_or(defaults.memory_kib()),
            )
            .with_iterations(
                matches
                    .get_one::<u32>(ARG_ARGON2_ITERATIONS)
                    .copied()
                    .unwrap_or(defaults.iterations()),
            )
            .with_parallelism(
                matches
                    .get_one::<u32>(ARG_ARGON2_PARALLELISM)
                    .copied()
                    .unwrap_or(defaults.parallelism()),
            )
            .with_salt_length(
                matches
                    .get_one::<usize>(ARG_ARGON2_SALT_LENGTH)
                    .copied()
                    .unwrap_or(defaults.salt_length()),
            )
            .with_output_length(
                matches
                    .get_one::<usize>(ARG_ARGON2_KEY_LENGTH)
                    .copied()
                    .unwrap_or(defaults.output_length()),
            );

        Self {
            hash_params,
            hash_concurrency: matches.get_one::<NonZeroUsize>(ARG_HASH_CONCURRENCY).copied(),
            claims_ttl_seconds: matches
                .get_one::<i64>(ARG_CLAIMS_TTL)
                .copied()
                .unwrap_or(3600),
            store_timeout: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_STORE_TIMEOUT)
                    .copied()
                    .unwrap_or(10),
            ),
        }
    }
}
