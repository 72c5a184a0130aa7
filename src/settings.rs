use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::privilege::{Manager, DEFAULT_POLICYKIT_DIR, DEFAULT_SUDOERS_DIR};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub privilege: Privilege,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Privilege {
    /// Directory receiving the generated sudoers fragment. Default: /etc/sudoers.d
    pub sudoers_dir: PathBuf,
    /// polkit configuration root; fragments live in `localauthority.conf.d`
    /// below it. Default: /etc/polkit-1
    pub policykit_dir: PathBuf,
}

impl Default for Privilege {
    fn default() -> Self {
        Self {
            sudoers_dir: PathBuf::from(DEFAULT_SUDOERS_DIR),
            policykit_dir: PathBuf::from(DEFAULT_POLICYKIT_DIR),
        }
    }
}

impl Privilege {
    pub fn manager(&self) -> Manager {
        Manager::new(&self.sudoers_dir, &self.policykit_dir)
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("privilege.sudoers_dir", DEFAULT_SUDOERS_DIR)
            .into_diagnostic()?
            .set_default("privilege.policykit_dir", DEFAULT_POLICYKIT_DIR)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PRIVGUARD__PRIVILEGE__SUDOERS_DIR=/tmp/sudoers.d, etc.
        builder = builder.add_source(config::Environment::with_prefix("PRIVGUARD").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let s: Settings = cfg.try_deserialize().into_diagnostic()?;

        Ok(s)
    }
}
