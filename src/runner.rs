use std::{fmt::Display, path::Path, process::Command, string};

use log::debug;

/// Captured result of one compiler invocation.
///
/// A non-zero exit with diagnostics on stdout is a *successful* run that
/// found type errors; only failure to execute the compiler at all is an
/// error here.
#[derive(Debug)]
pub struct CheckOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
#[non_exhaustive]
pub struct RunError {
    kind: RunErrorKind,
}

impl Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RunErrorKind::Command(_) => write!(f, "unable to spawn the TypeScript compiler"),
            RunErrorKind::InvalidUtf8(_) => {
                write!(f, "compiler output included invalid UTF-8")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            RunErrorKind::Command(err) => Some(err),
            RunErrorKind::InvalidUtf8(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub enum RunErrorKind {
    #[non_exhaustive]
    Command(std::io::Error),
    #[non_exhaustive]
    InvalidUtf8(string::FromUtf8Error),
}

impl From<string::FromUtf8Error> for RunErrorKind {
    fn from(err: string::FromUtf8Error) -> Self {
        Self::InvalidUtf8(err)
    }
}

/// Invoke the compiler against a synthesized project. The configuration
/// carries `noEmit`, so this is purely a type-checking pass.
pub fn run_check(project: &Path, cwd: &Path, command: &str) -> Result<CheckOutput, RunError> {
    (|| {
        debug!("invoking {} --project {:?}", command, project);
        let child = Command::new(command)
            .arg("--project")
            .arg(project)
            .current_dir(cwd)
            .output()
            .map_err(RunErrorKind::Command)?;

        let stdout = String::from_utf8(child.stdout)?;
        let stderr = String::from_utf8_lossy(&child.stderr).into_owned();
        Ok(CheckOutput {
            success: child.status.code() == Some(0),
            exit_code: child.status.code(),
            stdout,
            stderr,
        })
    })()
    .map_err(|kind| RunError { kind })
}
