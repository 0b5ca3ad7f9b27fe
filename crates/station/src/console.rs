//! Interactive command console.

use cleanstream_core::JobId;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Submit a reference for processing.
    Add(String),
    /// Cancel a job.
    Cancel(JobId),
    /// Retry a failed or cancelled job.
    Retry(JobId),
    /// List all known jobs.
    Jobs,
    /// Dump all jobs as JSON.
    Dump,
    /// Show engine counters.
    Status,
    /// Remove one finished job, or all finished jobs, from the list.
    Clear(Option<JobId>),
    /// Print usage.
    Help,
    /// Shut down and exit.
    Quit,
}

pub const USAGE: &str = "\
commands:
  add <url>      submit a reference for fetching and sanitizing
  cancel <id>    cancel a job (queued or running)
  retry <id>     re-submit a failed or cancelled job
  jobs           list all jobs
  dump           print all jobs as JSON
  status         show engine counters
  clear [id]     drop one finished job, or all of them, from the list
  help           show this message
  quit           shut down and exit";

/// Parses one console line. Empty lines yield no command.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments for '{}'", verb));
    }

    let command = match (verb, arg) {
        ("add", Some(reference)) => Command::Add(reference.to_string()),
        ("add", None) => return Err("usage: add <url>".to_string()),
        ("cancel", Some(id)) => Command::Cancel(parse_job_id(id)?),
        ("cancel", None) => return Err("usage: cancel <id>".to_string()),
        ("retry", Some(id)) => Command::Retry(parse_job_id(id)?),
        ("retry", None) => return Err("usage: retry <id>".to_string()),
        ("jobs", None) => Command::Jobs,
        ("dump", None) => Command::Dump,
        ("status", None) => Command::Status,
        ("clear", Some(id)) => Command::Clear(Some(parse_job_id(id)?)),
        ("clear", None) => Command::Clear(None),
        ("help", None) => Command::Help,
        ("quit", None) | ("exit", None) => Command::Quit,
        (verb, _) => return Err(format!("unknown command '{}', try 'help'", verb)),
    };
    Ok(Some(command))
}

fn parse_job_id(raw: &str) -> Result<JobId, String> {
    raw.parse::<u64>()
        .map(JobId::new)
        .map_err(|_| format!("'{}' is not a job id", raw))
}
