//! # CLI Command Implementations
//!
//! Each subcommand of `chartsmith` lives in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - `Args` structs defining the command-specific arguments, derived using
//!   `clap`.
//! - An async function per subcommand that takes the parsed arguments and the
//!   shared [`Context`](crate::cli::Context), calls into the `chartsmith`
//!   library, and prints the result.

pub mod browse;
pub mod completions;
pub mod pr;
pub mod services;
