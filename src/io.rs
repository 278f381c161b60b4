use std::{
    error::Error,
    fmt::Display,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use serde::Deserialize;

#[derive(Debug)]
#[non_exhaustive]
pub struct FromFileError {
    path: PathBuf,
    kind: FromFileErrorKind,
}

impl FromFileError {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Display for FromFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FromFileErrorKind::Open(_) => write!(f, "unable to open file {:?}", self.path),
            FromFileErrorKind::Read(_) => write!(f, "unable to read file {:?}", self.path),
            FromFileErrorKind::Parse(_) => write!(f, "unable to parse file {:?}", self.path),
        }
    }
}

impl Error for FromFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            FromFileErrorKind::Open(err) => Some(err),
            FromFileErrorKind::Read(err) => Some(err),
            FromFileErrorKind::Parse(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub enum FromFileErrorKind {
    #[non_exhaustive]
    Open(io::Error),
    #[non_exhaustive]
    Read(io::Error),
    #[non_exhaustive]
    Parse(json5::Error),
}

/// Read a tsconfig-style file into `T`.
///
/// tsconfig files are not strict JSON: the TypeScript compiler tolerates
/// comments and trailing commas, so parsing goes through json5 rather than
/// serde_json.
pub(crate) fn read_jsonc_from_file<P, T>(path: P) -> Result<T, FromFileError>
where
    P: AsRef<Path>,
    for<'de> T: Deserialize<'de>,
{
    fn inner<T>(path: &Path) -> Result<T, FromFileError>
    where
        for<'de> T: Deserialize<'de>,
    {
        (|| {
            let string = read_file_to_string(path)?;
            let parsed = json5::from_str(&string).map_err(FromFileErrorKind::Parse)?;
            Ok(parsed)
        })()
        .map_err(|kind| FromFileError {
            path: path.to_owned(),
            kind,
        })
    }
    inner(path.as_ref())
}

pub(crate) fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String, FromFileError> {
    read_file_to_string(path.as_ref()).map_err(|kind| FromFileError {
        path: path.as_ref().to_owned(),
        kind,
    })
}

fn read_file_to_string(path: &Path) -> Result<String, FromFileErrorKind> {
    // Reading a file into a string before invoking Serde is faster than
    // invoking Serde from a BufReader, see
    // https://github.com/serde-rs/json/issues/160
    let mut string = String::new();
    File::open(path)
        .map_err(FromFileErrorKind::Open)?
        .read_to_string(&mut string)
        .map_err(FromFileErrorKind::Read)?;
    Ok(string)
}
