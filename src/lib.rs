//! # snptx
//!
//! Credential and session core of the snptx snippet service.
//!
//! - `auth`: argon2id password hashing, the user credential store, claims,
//!   the per-request authentication middleware and the authorization gate.
//! - `session`: server-side sessions keyed by a hashed cookie token.
//! - `csrf`: per-session anti-forgery tokens checked on mutating requests.
//! - `api`: the axum application that wires everything together.
//! - `cli`: command line entry point (`serve`, `migrate`, `seed`).

pub mod api;
pub mod auth;
pub mod cli;
pub mod csrf;
pub mod db;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_hash_is_hex_or_unknown() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "unexpected commit hash: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
