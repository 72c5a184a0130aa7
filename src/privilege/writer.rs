use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use super::errors::PrivilegeError;
use super::fs::HostFs;
use super::types::CompiledPolicy;

/// Owner-only read/write.
pub const RULES_FILE_MODE: u32 = 0o600;
pub const AUTHORIZATION_FILE_MODE: u32 = 0o644;
pub const DIR_MODE: u32 = 0o755;

/// Final locations of the two generated files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPaths {
    pub escalation_rules: PathBuf,
    pub authorization: PathBuf,
}

/// What a commit did to the authorization file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Written,
    Removed,
}

/// Sibling temporary file, `<final>.new`. sudo skips names containing a dot
/// and polkit only reads `*.conf`, so neither picks up a half-written file.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".new");
    PathBuf::from(name)
}

/// Commits compiled policy to disk. Each file changes atomically through a
/// rename; the pair is not a single transaction.
pub struct DualFileWriter<'a, F: HostFs + ?Sized> {
    fs: &'a F,
    targets: &'a TargetPaths,
}

impl<'a, F: HostFs + ?Sized> DualFileWriter<'a, F> {
    pub fn new(fs: &'a F, targets: &'a TargetPaths) -> Self {
        Self { fs, targets }
    }

    /// Remove both files. Already absent files are fine.
    pub fn remove_all(&self) -> Result<(), PrivilegeError> {
        self.remove_if_exists(&self.targets.escalation_rules)?;
        self.remove_if_exists(&self.targets.authorization)?;
        Ok(())
    }

    pub fn commit(&self, compiled: &CompiledPolicy) -> Result<AuthorizationOutcome, PrivilegeError> {
        let rules_path = &self.targets.escalation_rules;
        let rules_tmp = temp_path(rules_path);
        self.ensure_parent(rules_path)?;
        self.fs
            .write_file(
                &rules_tmp,
                compiled.render_escalation_rules().as_bytes(),
                RULES_FILE_MODE,
            )
            .map_err(PrivilegeError::io("write", &rules_tmp))?;

        let authz_path = &self.targets.authorization;
        let authz_tmp = temp_path(authz_path);
        let authorization = compiled.authorization.render();
        if let Some(content) = &authorization {
            let staged = self.ensure_parent(authz_path).and_then(|()| {
                self.fs
                    .write_file(&authz_tmp, content.as_bytes(), AUTHORIZATION_FILE_MODE)
                    .map_err(PrivilegeError::io("write", &authz_tmp))
            });
            if let Err(e) = staged {
                self.discard(&rules_tmp);
                return Err(e);
            }
        }

        self.fs
            .rename(&rules_tmp, rules_path)
            .map_err(PrivilegeError::io("rename", &rules_tmp))?;
        tracing::debug!(path = %rules_path.display(), "Installed escalation rules");

        if authorization.is_some() {
            self.fs
                .rename(&authz_tmp, authz_path)
                .map_err(PrivilegeError::io("rename", &authz_tmp))?;
            tracing::debug!(path = %authz_path.display(), "Installed authorization override");
            Ok(AuthorizationOutcome::Written)
        } else {
            self.remove_if_exists(authz_path)?;
            Ok(AuthorizationOutcome::Removed)
        }
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), PrivilegeError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self
                .fs
                .create_dir_all(parent, DIR_MODE)
                .map_err(PrivilegeError::io("create directory", parent)),
            _ => Ok(()),
        }
    }

    /// Best-effort removal of a staged temp file after a failed commit.
    fn discard(&self, tmp: &Path) {
        if let Err(e) = self.fs.remove_file(tmp) {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove temporary file");
        }
    }

    fn remove_if_exists(&self, path: &Path) -> Result<(), PrivilegeError> {
        match self.fs.remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PrivilegeError::io("remove", path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::fs::MemoryFs;
    use crate::privilege::types::AuthorizationDocument;
    use crate::privilege::GENERATED_HEADER;

    fn targets() -> TargetPaths {
        TargetPaths {
            escalation_rules: PathBuf::from("/etc/sudoers.d/99-rules"),
            authorization: PathBuf::from("/etc/polkit-1/localauthority.conf.d/99-rules.conf"),
        }
    }

    fn denial() -> CompiledPolicy {
        CompiledPolicy {
            rule_blocks: vec![vec!["%admin\tALL=(ALL) !ALL".into()]],
            authorization: AuthorizationDocument::ExplicitOnly {
                granted: vec!["unix-user:bob".into()],
            },
        }
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/etc/sudoers.d/99-rules")),
            PathBuf::from("/etc/sudoers.d/99-rules.new")
        );
    }

    #[test]
    fn test_commit_writes_both_files_with_modes() {
        let fs = MemoryFs::new();
        let targets = targets();

        let outcome = DualFileWriter::new(&fs, &targets).commit(&denial()).unwrap();

        assert_eq!(outcome, AuthorizationOutcome::Written);
        assert_eq!(
            fs.contents(&targets.escalation_rules).unwrap(),
            format!("{GENERATED_HEADER}%admin\tALL=(ALL) !ALL\n\n")
        );
        assert_eq!(
            fs.contents(&targets.authorization).unwrap(),
            format!("{GENERATED_HEADER}[Configuration]\nAdminIdentities=unix-user:bob\n")
        );
        assert_eq!(fs.mode(&targets.escalation_rules), Some(RULES_FILE_MODE));
        assert_eq!(fs.mode(&targets.authorization), Some(AUTHORIZATION_FILE_MODE));
        assert_eq!(fs.mode("/etc/polkit-1/localauthority.conf.d"), Some(DIR_MODE));
        assert_eq!(fs.files(), vec![targets.authorization.clone(), targets.escalation_rules.clone()]);
    }

    #[test]
    fn test_absent_authorization_removes_previous_file() {
        let fs = MemoryFs::new();
        let targets = targets();
        fs.insert_file(&targets.authorization, "old override");

        let compiled = CompiledPolicy {
            rule_blocks: vec![],
            authorization: AuthorizationDocument::Absent,
        };
        let outcome = DualFileWriter::new(&fs, &targets).commit(&compiled).unwrap();

        assert_eq!(outcome, AuthorizationOutcome::Removed);
        assert!(!fs.exists(&targets.authorization));
        assert_eq!(
            fs.contents(&targets.escalation_rules).as_deref(),
            Some(GENERATED_HEADER)
        );
    }

    #[test]
    fn test_stale_temp_file_is_truncated() {
        let fs = MemoryFs::new();
        let targets = targets();
        fs.insert_file(
            temp_path(&targets.escalation_rules),
            "garbage from an interrupted run that is much longer than the header",
        );

        DualFileWriter::new(&fs, &targets).commit(&denial()).unwrap();

        assert!(!fs.exists(temp_path(&targets.escalation_rules)));
        assert!(fs
            .contents(&targets.escalation_rules)
            .unwrap()
            .starts_with(GENERATED_HEADER));
    }

    #[test]
    fn test_remove_all_is_idempotent() {
        let fs = MemoryFs::new();
        let targets = targets();
        fs.insert_file(&targets.escalation_rules, "x");

        let writer = DualFileWriter::new(&fs, &targets);
        writer.remove_all().unwrap();
        writer.remove_all().unwrap();

        assert!(fs.files().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_previous_files() {
        let fs = MemoryFs::new();
        let targets = targets();
        fs.insert_file(&targets.escalation_rules, "previous rules");
        // A directory in place of the temp file makes the write fail.
        fs.insert_dir(temp_path(&targets.authorization));

        let err = DualFileWriter::new(&fs, &targets).commit(&denial()).unwrap_err();

        assert!(matches!(err, PrivilegeError::Io { op: "write", .. }));
        assert_eq!(
            fs.contents(&targets.escalation_rules).as_deref(),
            Some("previous rules")
        );
        assert!(!fs.exists(&targets.authorization));
        assert!(!fs.exists(temp_path(&targets.escalation_rules)));
    }
}
