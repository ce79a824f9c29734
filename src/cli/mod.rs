//! Command-line interface
//!
//! Runs report operations against a tenant loaded from a JSON fixture:
//! - materialize: run one materialization and print its status
//! - query: print one page of a report
//! - count: print the rows visible to a set of owners
//! - download: stream every row as JSON lines

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, FixtureArgs};
pub use commands::{count, download, load_config, materialize, query, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{load_fixture, read_request, write_error, write_line, write_response};
