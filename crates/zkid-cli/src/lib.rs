//! # zkid-cli — Command-Line Interface
//!
//! Provides the `zkid` binary.
//!
//! ## Subcommands
//!
//! - `zkid token inspect` — decode a plain, JWS or JWZ envelope.
//! - `zkid state hash` — hash tree roots into an identity state and derive
//!   the genesis DID.
//! - `zkid publisher run` — run the publisher loop on a local chain.
//!
//! ```bash
//! zkid token inspect response.jwz
//! zkid state hash --claims-root 1234 --chain polygon:amoy
//! zkid -v publisher run --identities 4 --duration 30 --metrics-addr 127.0.0.1:9100
//! ```
//!
//! ## Crate Policy
//!
//! - Argument parsing lives next to each handler; handlers return an exit
//!   code and delegate to the library crates.
//! - Output is JSON on stdout. Logs go to stderr.

pub mod publisher;
pub mod state;
pub mod token;
