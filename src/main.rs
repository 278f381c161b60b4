use std::{
    io::Write,
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use clap::Parser;
use log::{debug, info, LevelFilter};
use rayon::prelude::*;

use tsc_scoped::{
    closure::{self, ClosureCache, TscFileLister},
    error::{CheckError, EXIT_SYSTEM_ERROR, EXIT_TYPE_ERRORS},
    grouping::{self, FileGroup},
    runner::{self, CheckOutput},
    synthesize,
};

/// Type-check an explicit list of TypeScript files with their governing
/// tsconfig.
#[derive(Debug, Parser)]
#[command(name = "tsc-scoped", version)]
struct Cli {
    /// Files, directories, or glob patterns to type-check
    #[arg(required = true)]
    files: Vec<String>,

    /// Explicit tsconfig applied to every input file, skipping the per-file
    /// ancestor search
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Additional file to include in every group, e.g. an ambient
    /// declaration file (repeatable)
    #[arg(long = "include", value_name = "FILE")]
    include_files: Vec<PathBuf>,

    /// Working directory against which relative inputs are resolved
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// TypeScript compiler executable to invoke
    #[arg(long, default_value = "tsc")]
    tsc: String,

    /// Set skipLibCheck in the generated configurations
    #[arg(long)]
    skip_lib_check: bool,

    /// Log the grouping and discovery process
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug)]
enum GroupOutcome {
    Clean,
    TypeErrors(CheckOutput),
    /// Not dispatched because a sibling group hit a fatal system error.
    Skipped,
    Failed(CheckError),
}

fn main() {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    // Drop-based cleanup does not run when the process is killed by a
    // signal; remove live synthetic configurations before dying.
    if let Err(err) = ctrlc::set_handler(|| {
        synthesize::remove_registered_files();
        std::process::exit(130);
    }) {
        debug!("unable to install termination handler: {}", err);
    }

    std::process::exit(match run(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    });
}

fn run(mut cli: Cli) -> Result<i32, CheckError> {
    let cwd = match cli.cwd.take() {
        Some(cwd) => cwd,
        None => std::env::current_dir().map_err(CheckError::WorkingDirectory)?,
    };

    let groups = grouping::group_files(&cli.files, &cwd, cli.project.as_deref())?;
    if groups.is_empty() {
        info!("no matching files to check");
        return Ok(0);
    }
    debug!("checking {} group(s)", groups.len());

    let cache = ClosureCache::new();
    let lister = TscFileLister {
        command: cli.tsc.clone(),
    };
    // Once one group fails fatally, finish what is in flight but do not
    // dispatch anything new.
    let fatal = AtomicBool::new(false);

    let mut results: Vec<(PathBuf, usize, GroupOutcome)> = groups
        .par_iter()
        .map(|group| {
            let outcome = if fatal.load(Ordering::SeqCst) {
                GroupOutcome::Skipped
            } else {
                match check_group(group, &cli, &cwd, &cache, &lister) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        fatal.store(true, Ordering::SeqCst);
                        GroupOutcome::Failed(err)
                    }
                }
            };
            (group.config_path.clone(), group.files.len(), outcome)
        })
        .collect();

    // Results arrive in any order; present them deterministically.
    results.sort_by(|left, right| left.0.cmp(&right.0));

    let mut exit_code = 0;
    let stdout = std::io::stdout();
    for (config_path, file_count, outcome) in results {
        match outcome {
            GroupOutcome::Clean => {
                debug!("{:?}: {} file(s) clean", config_path, file_count);
            }
            GroupOutcome::TypeErrors(output) => {
                let mut handle = stdout.lock();
                let _ = write!(handle, "{}", output.stdout);
                let _ = handle.flush();
                if !output.stderr.is_empty() {
                    eprint!("{}", output.stderr);
                }
                eprintln!(
                    "type errors found under {:?} (exit code {:?})",
                    config_path, output.exit_code
                );
                exit_code = exit_code.max(EXIT_TYPE_ERRORS);
            }
            GroupOutcome::Skipped => {
                eprintln!("{:?}: skipped after earlier fatal error", config_path);
            }
            GroupOutcome::Failed(err) => {
                report_error(&err);
                exit_code = exit_code.max(EXIT_SYSTEM_ERROR);
            }
        }
    }

    Ok(exit_code)
}

fn check_group(
    group: &FileGroup,
    cli: &Cli,
    cwd: &std::path::Path,
    cache: &ClosureCache,
    lister: &TscFileLister,
) -> Result<GroupOutcome, CheckError> {
    let closure = closure::discover(
        &group.config,
        &group.files,
        &cli.include_files,
        cwd,
        cache,
        lister,
    );
    if let closure::Closure::Discovered {
        source_files,
        setup_files,
    } = &closure
    {
        debug!(
            "{:?}: closure of {} file(s) from {} root(s)",
            group.config_path,
            source_files.len(),
            group.files.len()
        );
        for setup_file in setup_files {
            info!("including test setup file {:?}", setup_file);
        }
    }

    let synthetic = synthesize::synthesize(&group.config, &closure, &group.files, cli.skip_lib_check)?;
    let output = runner::run_check(synthetic.path(), cwd, &cli.tsc)?;

    // The synthetic config is dropped (and deleted) here, whether or not the
    // compiler run succeeded.
    if output.success {
        Ok(GroupOutcome::Clean)
    } else {
        Ok(GroupOutcome::TypeErrors(output))
    }
}

fn report_error(err: &dyn std::error::Error) {
    eprintln!("error: {}", err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}
