//! CLI and environment option parsing.
//!
//! Flags are parsed with `getopts`, the way `compiletest`/`rustbook` do.
//! Environment variables are applied first, then CLI flags override them,
//! mirroring `proptest::test_runner::Config`'s `PROPTEST_*` handling.

use std::env;
use std::ffi::OsString;
use std::fmt;

use crate::error::PartestError;

/// One entry of a `--filter`/`-f` list: a prefix, optionally negated with a
/// leading `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub negated: bool,
    pub prefix: String,
}

impl Filter {
    fn parse_one(raw: &str) -> Filter {
        if let Some(rest) = raw.strip_prefix('-') {
            Filter {
                negated: true,
                prefix: rest.to_string(),
            }
        } else {
            Filter {
                negated: false,
                prefix: raw.to_string(),
            }
        }
    }

    fn parse_list(raw: &str) -> Vec<Filter> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Filter::parse_one)
            .collect()
    }
}

/// Populated configuration: the effective options after env vars and CLI
/// flags have both been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub bench: bool,
    pub bench_dur_s: f64,
    pub filter: Vec<Filter>,
    pub jobs: usize,
    pub no_capture: bool,
    pub no_fork: bool,
    pub port_base: u16,
    pub timeout_s: f64,
    pub verbose: u32,
}

impl Options {
    pub fn capture(&self) -> bool {
        !self.no_capture
    }

    pub fn fork(&self) -> bool {
        !self.no_fork
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

impl Default for Options {
    fn default() -> Self {
        Options {
            bench: false,
            bench_dur_s: 1.0,
            filter: Vec::new(),
            jobs: default_jobs(),
            no_capture: false,
            no_fork: false,
            port_base: 23_120,
            timeout_s: 5.0,
            verbose: 0,
        }
    }
}

const USAGE: &str = "\
Usage: <test-binary> [options]

Options:
    -b, --bench              include benchmark tests
    -d, --bench-dur=N        bench budget in seconds (default: 1)
    -f, --filter=S           filter list, repeatable, comma-separated,
                              '-' prefix negates
    -h, --help               print this help menu
    -j, --jobs=N             worker count (default: number of CPUs)
    -n, --nocapture          disable stdout/stderr capture
    -s, --nofork             run single-process, single-threaded
    -p, --port=N             port base (default: 23120)
    -t, --timeout=N          default per-test timeout in seconds (default: 5)
    -v, --verbose            raise verbosity (repeatable)
";

fn parse_env_bool(var: &str) -> Option<bool> {
    env::var(var).ok().map(|v| v != "0" && !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: fmt::Display,
{
    match env::var(var) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(e) => {
                eprintln!(
                    "partest: the env-var {}={} can't be parsed: {}",
                    var, raw, e
                );
                None
            }
        },
        Err(_) => None,
    }
}

fn from_env() -> Options {
    let mut opts = Options::default();
    if let Some(v) = parse_env_bool("PTBENCH") {
        opts.bench = v;
    }
    if let Some(v) = parse_env("PTBENCHDUR") {
        opts.bench_dur_s = v;
    }
    if let Ok(raw) = env::var("PTFILTER") {
        opts.filter = Filter::parse_list(&raw);
    }
    if let Some(v) = parse_env("PTJOBS") {
        opts.jobs = v;
    }
    if let Some(v) = parse_env_bool("PTNOCAPTURE") {
        opts.no_capture = v;
    }
    if let Some(v) = parse_env_bool("PTNOFORK") {
        opts.no_fork = v;
    }
    if let Some(v) = parse_env("PTPORT") {
        opts.port_base = v;
    }
    if let Some(v) = parse_env("PTTIMEOUT") {
        opts.timeout_s = v;
    }
    if let Some(v) = parse_env("PTVERBOSE") {
        opts.verbose = v;
    }
    opts
}

/// Outcome of parsing: either a populated `Options`, or a request to print
/// usage and exit 1 (the `-h`/`--help` path exits 1 as well).
pub enum ParseOutcome {
    Options(Options),
    Usage(String),
}

/// Parses CLI args over the env-derived defaults. `args` excludes argv[0].
pub fn parse(args: &[OsString]) -> Result<ParseOutcome, PartestError> {
    let mut opts = from_env();

    let mut getopts_opts = getopts::Options::new();
    getopts_opts
        .optflag("b", "bench", "include benchmark tests")
        .optopt("d", "bench-dur", "bench budget seconds", "N")
        .optmulti("f", "filter", "filter list", "S")
        .optflag("h", "help", "print usage")
        .optopt("j", "jobs", "worker count", "N")
        .optflag("n", "nocapture", "disable capture")
        .optflag("s", "nofork", "disable isolation")
        .optopt("p", "port", "port base", "N")
        .optopt("t", "timeout", "default timeout seconds", "N")
        .optflagmulti("v", "verbose", "raise verbosity");

    let args: Vec<String> = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let matches = getopts_opts
        .parse(&args)
        .map_err(|e| PartestError::OptionParse(e.to_string()))?;

    if matches.opt_present("h") {
        return Ok(ParseOutcome::Usage(USAGE.to_string()));
    }

    if matches.opt_present("b") {
        opts.bench = true;
    }
    if let Some(raw) = matches.opt_str("d") {
        opts.bench_dur_s = raw
            .parse()
            .map_err(|_| PartestError::OptionParse(format!("bad --bench-dur: {raw}")))?;
    }
    for raw in matches.opt_strs("f") {
        opts.filter.extend(Filter::parse_list(&raw));
    }
    if let Some(raw) = matches.opt_str("j") {
        opts.jobs = raw
            .parse()
            .map_err(|_| PartestError::OptionParse(format!("bad --jobs: {raw}")))?;
    }
    if matches.opt_present("n") {
        opts.no_capture = true;
    }
    if matches.opt_present("s") {
        opts.no_fork = true;
    }
    if let Some(raw) = matches.opt_str("p") {
        opts.port_base = raw
            .parse()
            .map_err(|_| PartestError::OptionParse(format!("bad --port: {raw}")))?;
    }
    if let Some(raw) = matches.opt_str("t") {
        opts.timeout_s = raw
            .parse()
            .map_err(|_| PartestError::OptionParse(format!("bad --timeout: {raw}")))?;
    }
    opts.verbose += matches.opt_count("v") as u32;

    Ok(ParseOutcome::Options(opts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_sane_port_and_timeout() {
        let opts = Options::default();
        assert_eq!(opts.port_base, 23_120);
        assert!((opts.timeout_s - 5.0).abs() < 1e-9);
        assert!(opts.jobs >= 1);
    }

    #[test]
    fn filter_list_parses_negation() {
        let filters = Filter::parse_list("a,-b,c");
        assert_eq!(filters.len(), 3);
        assert!(filters[1].negated);
        assert_eq!(filters[1].prefix, "b");
    }

    #[test]
    fn parses_jobs_and_bench_flags() {
        let args: Vec<OsString> = vec!["-j".into(), "4".into(), "-b".into()];
        match parse(&args).unwrap() {
            ParseOutcome::Options(opts) => {
                assert_eq!(opts.jobs, 4);
                assert!(opts.bench);
            }
            ParseOutcome::Usage(_) => panic!("expected options"),
        }
    }

    #[test]
    fn help_flag_requests_usage() {
        let args: Vec<OsString> = vec!["-h".into()];
        match parse(&args).unwrap() {
            ParseOutcome::Usage(_) => {}
            ParseOutcome::Options(_) => panic!("expected usage"),
        }
    }
}
