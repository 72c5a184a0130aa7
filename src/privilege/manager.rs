use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::compiler::compile;
use super::errors::PrivilegeError;
use super::fragments::system_admin_identities;
use super::fs::{HostFs, OsFs};
use super::types::{CompiledPolicy, PolicyEntry};
use super::writer::{AuthorizationOutcome, DualFileWriter, TargetPaths};
use super::{BASE_CONF_NAME, DEFAULT_POLICYKIT_DIR, DEFAULT_SUDOERS_DIR, FRAGMENT_SUBDIR};

/// Applies privilege policy for this host. Concurrent calls are serialized:
/// one `apply_policy` runs to completion before the next touches the disk.
#[derive(Debug)]
pub struct Manager<F: HostFs = OsFs> {
    apply_lock: Mutex<()>,
    fs: F,
    targets: TargetPaths,
    fragment_dir: PathBuf,
}

impl Manager<OsFs> {
    /// Empty directories fall back to the system defaults.
    pub fn new(sudoers_dir: impl Into<PathBuf>, policykit_dir: impl Into<PathBuf>) -> Self {
        Self::with_fs(OsFs, sudoers_dir, policykit_dir)
    }
}

impl<F: HostFs> Manager<F> {
    pub fn with_fs(
        fs: F,
        sudoers_dir: impl Into<PathBuf>,
        policykit_dir: impl Into<PathBuf>,
    ) -> Self {
        let sudoers_dir = or_default(sudoers_dir.into(), DEFAULT_SUDOERS_DIR);
        let policykit_dir = or_default(policykit_dir.into(), DEFAULT_POLICYKIT_DIR);
        let fragment_dir = policykit_dir.join(FRAGMENT_SUBDIR);

        Self {
            apply_lock: Mutex::new(()),
            fs,
            targets: TargetPaths {
                escalation_rules: sudoers_dir.join(BASE_CONF_NAME),
                authorization: fragment_dir.join(format!("{BASE_CONF_NAME}.conf")),
            },
            fragment_dir,
        }
    }

    pub fn targets(&self) -> &TargetPaths {
        &self.targets
    }

    pub fn fragment_dir(&self) -> &Path {
        &self.fragment_dir
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Compile `entries` against the current foreign polkit configuration
    /// without writing anything.
    pub fn compile(&self, entries: &[PolicyEntry]) -> Result<CompiledPolicy, PrivilegeError> {
        let system_admins = system_admin_identities(&self.fs, &self.fragment_dir)?;
        Ok(compile(entries, &system_admins))
    }

    /// Generate the sudoers and polkit files for `object_name` from `entries`.
    ///
    /// Only computers carry privilege policy; user objects are a no-op. An
    /// empty entry list removes both files.
    pub fn apply_policy(
        &self,
        object_name: &str,
        is_computer: bool,
        entries: &[PolicyEntry],
    ) -> Result<(), PrivilegeError> {
        if !is_computer {
            return Ok(());
        }

        let _guard = self
            .apply_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.apply_locked(object_name, entries)
            .map_err(|source| PrivilegeError::Apply {
                object: object_name.to_string(),
                source: Box::new(source),
            })
    }

    fn apply_locked(&self, object_name: &str, entries: &[PolicyEntry]) -> Result<(), PrivilegeError> {
        tracing::debug!(object = object_name, "Applying privilege policy");

        let writer = DualFileWriter::new(&self.fs, &self.targets);

        if entries.is_empty() {
            writer.remove_all()?;
            tracing::info!(object = object_name, "No privilege policy, removed generated files");
            return Ok(());
        }

        let compiled = self.compile(entries)?;
        let outcome = writer.commit(&compiled)?;

        tracing::info!(
            object = object_name,
            rules = compiled.rule_blocks.len(),
            admins = outcome == AuthorizationOutcome::Written,
            "Applied privilege policy"
        );

        Ok(())
    }
}

fn or_default(dir: PathBuf, default: &str) -> PathBuf {
    if dir.as_os_str().is_empty() {
        PathBuf::from(default)
    } else {
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::fs::MemoryFs;
    use crate::privilege::GENERATED_HEADER;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn manager() -> Manager<MemoryFs> {
        Manager::with_fs(MemoryFs::new(), "/etc/sudoers.d", "/etc/polkit-1")
    }

    #[test]
    fn test_default_paths() {
        let m = Manager::new("", "");
        assert_eq!(
            m.targets().escalation_rules,
            PathBuf::from("/etc/sudoers.d/99-privguard-privilege-enforcement")
        );
        assert_eq!(
            m.targets().authorization,
            PathBuf::from(
                "/etc/polkit-1/localauthority.conf.d/99-privguard-privilege-enforcement.conf"
            )
        );
        assert_eq!(
            m.fragment_dir(),
            Path::new("/etc/polkit-1/localauthority.conf.d")
        );
    }

    #[test]
    fn test_user_object_is_noop() {
        let m = manager();
        m.apply_policy("alice", false, &[PolicyEntry::new("allow-local-admins", "", true)])
            .unwrap();
        assert!(m.fs().files().is_empty());
    }

    #[test]
    fn test_apply_then_clear() {
        let m = manager();
        m.apply_policy("host", true, &[PolicyEntry::new("client-admins", "bob", false)])
            .unwrap();
        assert!(m.fs().exists(&m.targets().escalation_rules));
        assert_eq!(
            m.fs().contents(&m.targets().authorization).unwrap(),
            format!("{GENERATED_HEADER}[Configuration]\nAdminIdentities=unix-user:bob\n")
        );

        m.apply_policy("host", true, &[]).unwrap();
        assert!(m.fs().files().is_empty());
    }

    #[test]
    fn test_corrupt_fragment_fails_before_writing() {
        let m = manager();
        m.fs()
            .insert_file(m.fragment_dir().join("50-broken.conf"), "garbage");

        let err = m
            .apply_policy("host", true, &[PolicyEntry::new("client-admins", "bob", false)])
            .unwrap_err();

        assert!(matches!(err, PrivilegeError::Apply { ref object, .. } if object == "host"));
        assert!(matches!(err.root(), PrivilegeError::FragmentParse { .. }));
        assert_eq!(m.fs().files(), vec![m.fragment_dir().join("50-broken.conf")]);
    }

    /// Counts how many writers are inside the filesystem at once.
    struct OverlapFs {
        inner: MemoryFs,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl OverlapFs {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
        }

        fn leave(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl HostFs for OverlapFs {
        fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
            self.inner.create_dir_all(path, mode)
        }

        fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
            self.enter();
            let res = self.inner.write_file(path, contents, mode);
            self.leave();
            res
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.enter();
            let res = self.inner.rename(from, to);
            self.leave();
            res
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_file(path)
        }

        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.inner.read_to_string(path)
        }

        fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
            self.inner.read_dir(path)
        }

        fn is_dir(&self, path: &Path) -> io::Result<bool> {
            self.inner.is_dir(path)
        }
    }

    #[test]
    fn test_concurrent_applies_do_not_interleave() {
        let fs = OverlapFs {
            inner: MemoryFs::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        };
        let m = Arc::new(Manager::with_fs(fs, "/etc/sudoers.d", "/etc/polkit-1"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    let entries = vec![PolicyEntry::new("client-admins", format!("user{i}"), false)];
                    m.apply_policy("host", true, &entries)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(m.fs().max_active.load(Ordering::SeqCst), 1);

        // Whoever ran last, both files describe the same single grant.
        let rules = m.fs().inner.contents(&m.targets().escalation_rules).unwrap();
        let admins = m.fs().inner.contents(&m.targets().authorization).unwrap();
        let user = rules
            .lines()
            .find_map(|l| l.strip_prefix('"').and_then(|l| l.split('"').next()))
            .unwrap()
            .to_string();
        assert!(admins.ends_with(&format!("AdminIdentities=unix-user:{user}\n")));
        assert!(!m.fs().inner.exists(crate::privilege::writer::temp_path(
            &m.targets().escalation_rules
        )));
    }
}
