//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to the job controller and the
//! generation service.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{map_error, CliError};
pub use parse::{
    Cli, Commands, ConfigCommands, EvaluationCommands, GenerationArgs, JobCommands,
    UseCaseCommands,
};
pub use route::RunContext;
