use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use privguard::privilege::{Manager, PolicyEntry};
use tempfile::TempDir;

/// Fake host root with sudoers and polkit directories, removed on drop
pub struct TestHost {
    root: TempDir,
    manager: Manager,
}

impl TestHost {
    /// Create an empty host; target directories are created on demand
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let manager = Manager::new(
            root.path().join("etc/sudoers.d"),
            root.path().join("etc/polkit-1"),
        );
        Self { root, manager }
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn rules_path(&self) -> PathBuf {
        self.manager.targets().escalation_rules.clone()
    }

    pub fn authorization_path(&self) -> PathBuf {
        self.manager.targets().authorization.clone()
    }

    /// Apply `entries` as a computer object
    pub fn apply(&self, entries: &[PolicyEntry]) {
        self.manager
            .apply_policy("testhost", true, entries)
            .expect("Failed to apply privilege policy");
    }

    /// Drop a foreign polkit fragment next to ours
    pub fn add_fragment(&self, name: &str, admin_identities: &str) {
        let dir = self.manager.fragment_dir();
        fs::create_dir_all(dir).expect("Failed to create fragment dir");
        fs::write(
            dir.join(name),
            format!("[Configuration]\nAdminIdentities={admin_identities}\n"),
        )
        .expect("Failed to write fragment");
    }

    pub fn read(&self, path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    pub fn mode(&self, path: &Path) -> u32 {
        fs::metadata(path)
            .expect("Failed to stat file")
            .permissions()
            .mode()
            & 0o777
    }

    /// `AdminIdentities` value of our polkit fragment, if it exists
    pub fn admin_identities(&self) -> Option<String> {
        let content = self.read(&self.authorization_path())?;
        content
            .lines()
            .find_map(|l| l.strip_prefix("AdminIdentities="))
            .map(str::to_string)
    }
}

pub fn entry(key: &str, value: &str, disabled: bool) -> PolicyEntry {
    PolicyEntry::new(key, value, disabled)
}
