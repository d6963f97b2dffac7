use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

/// Where a run reads its log lines from. Files ending in `.gz` are
/// decompressed on the fly, which covers logrotate'd daemon logs.
#[derive(Debug, Clone)]
pub enum LineSource {
    File(PathBuf),
    Text(String),
}

impl LineSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        LineSource::File(path.into())
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        LineSource::Text(text.into())
    }

    /// Opens the source for lazy line-by-line iteration.
    pub fn lines(&self) -> io::Result<Lines> {
        let reader: Box<dyn BufRead> = match self {
            LineSource::File(path) => {
                let file = File::open(path)?;
                if is_gzip(path) {
                    Box::new(BufReader::new(MultiGzDecoder::new(file)))
                } else {
                    Box::new(BufReader::new(file))
                }
            }
            LineSource::Text(text) => Box::new(Cursor::new(text.clone().into_bytes())),
        };

        Ok(Lines {
            reader,
            buf: Vec::new(),
        })
    }
}

impl fmt::Display for LineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineSource::File(path) => write!(f, "{}", path.display()),
            LineSource::Text(_) => write!(f, "<text>"),
        }
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Line iterator that tolerates invalid UTF-8, which shows up in hostnames and
/// module paths of real daemon logs.
pub struct Lines {
    reader: Box<dyn BufRead>,
    buf: Vec<u8>,
}

impl Iterator for Lines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
