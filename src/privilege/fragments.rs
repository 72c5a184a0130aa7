use std::io;
use std::path::Path;

use ini::{Ini, ParseOption};

use super::errors::PrivilegeError;
use super::fs::HostFs;
use super::OWN_FRAGMENT_NAME;

const CONFIGURATION_SECTION: &str = "Configuration";
const ADMIN_IDENTITIES_KEY: &str = "AdminIdentities";
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Parsed `[Section]` / `Key=Value` document, as used by polkit's local
/// authority configuration.
///
/// Values are literal: `;` separates identities in `AdminIdentities`, so
/// quote, escape and inline comment handling are all off.
#[derive(Debug, Clone)]
pub struct KeyFile {
    ini: Ini,
}

impl KeyFile {
    pub fn parse(path: &Path, source: &str) -> Result<Self, PrivilegeError> {
        let source = source.strip_prefix(BYTE_ORDER_MARK).unwrap_or(source);
        let opt = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(source, opt).map_err(|e| PrivilegeError::FragmentParse {
            path: path.to_path_buf(),
            line: e.line + 1,
            message: e.msg.to_string(),
        })?;
        Ok(Self { ini })
    }

    /// Value of `key` in `section`. A repeated key resolves to its last value.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .section(Some(section))
            .and_then(|props| props.get_all(key).last())
    }
}

/// Return the `AdminIdentities` value currently in effect across all
/// authorization fragments in `fragment_dir`, ignoring our own fragment.
///
/// Fragments are layered in lexical filename order and the last one defining
/// the key wins, as polkit does. A missing directory yields an empty string.
/// A fragment that can't be stat'ed or parsed is an error.
pub fn system_admin_identities<F: HostFs + ?Sized>(
    fs: &F,
    fragment_dir: &Path,
) -> Result<String, PrivilegeError> {
    let mut names = match fs.read_dir(fragment_dir) {
        Ok(names) => names,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(dir = %fragment_dir.display(), "No authorization fragment directory");
            return Ok(String::new());
        }
        Err(e) => return Err(PrivilegeError::io("list", fragment_dir)(e)),
    };
    names.retain(|name| name.ends_with(".conf") && name != OWN_FRAGMENT_NAME);
    names.sort();

    let mut admin_identities = String::new();
    for name in names {
        let path = fragment_dir.join(&name);
        if fs.is_dir(&path).map_err(PrivilegeError::io("stat", &path))? {
            tracing::warn!(path = %path.display(), "Authorization fragment is a directory. Ignoring.");
            continue;
        }

        let source = fs
            .read_to_string(&path)
            .map_err(PrivilegeError::io("read", &path))?;
        let key_file = KeyFile::parse(&path, &source)?;
        if let Some(value) = key_file.get(CONFIGURATION_SECTION, ADMIN_IDENTITIES_KEY) {
            admin_identities = value.to_string();
        }
    }

    Ok(admin_identities)
}
