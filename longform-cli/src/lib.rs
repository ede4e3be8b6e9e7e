//! # longform-cli
//!
//! Command line front end for `longform-core`.
//!
//! ## Subcommands
//!
//! - **capture**: Run the scroll-and-reconverge loop over a recorded UI tree
//!   and write the article text, optionally sending it straight to a peer.
//! - **send**: Transfer a file to a peer.
//! - **listen**: Emulate an e-ink peer and store the files it receives.

pub mod config;
pub mod service;
