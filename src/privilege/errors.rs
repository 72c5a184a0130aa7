use std::io;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PrivilegeError {
    #[error("can't apply privilege policy to {object}")]
    #[diagnostic(code(privguard::privilege::apply))]
    Apply {
        object: String,
        #[source]
        source: Box<PrivilegeError>,
    },

    #[error("failed to {op} `{}`", .path.display())]
    #[diagnostic(code(privguard::privilege::io))]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't parse authorization fragment `{}` at line {line}: {message}", .path.display())]
    #[diagnostic(
        code(privguard::privilege::fragment_parse),
        help("Fragments must contain `[Section]` headers followed by `Key=Value` lines; fix or remove the file")
    )]
    FragmentParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(privguard::privilege::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoad {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(privguard::privilege::kdl_parse),
        help("Check the entry file against the KDL syntax described at https://kdl.dev")
    )]
    KdlParse(String),

    #[error("Invalid policy entry: {0}")]
    #[diagnostic(
        code(privguard::privilege::invalid_entry),
        help("Entry syntax: entry \"client-admins\" value=\"alice,bob\" disabled=#false")
    )]
    InvalidEntry(String),
}

impl PrivilegeError {
    /// Builds a `map_err` adapter annotating an I/O failure with the operation and path.
    pub(crate) fn io(op: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| PrivilegeError::Io { op, path, source }
    }

    /// Innermost error, skipping the per-object `Apply` wrapper.
    pub fn root(&self) -> &PrivilegeError {
        match self {
            PrivilegeError::Apply { source, .. } => source.root(),
            other => other,
        }
    }
}
