//! Privilege escalation policy: who may use sudo, and who polkit treats as a
//! local administrator.
//!
//! Two files are managed, both named after [`BASE_CONF_NAME`]:
//! - a sudoers fragment in the sudoers directory,
//! - a polkit local authority fragment overriding `AdminIdentities`.

pub mod compiler;
pub mod errors;
pub mod fragments;
pub mod fs;
pub mod loader;
pub mod manager;
pub mod normalize;
pub mod types;
pub mod writer;

pub use errors::PrivilegeError;
pub use manager::Manager;
pub use types::{AuthorizationDocument, CompiledPolicy, EntryKey, Identity, PolicyEntry};

/// Reserved base name of the generated sudoers and polkit fragments.
pub const BASE_CONF_NAME: &str = "99-privguard-privilege-enforcement";

/// File name of our own polkit fragment, excluded when reading foreign ones.
pub const OWN_FRAGMENT_NAME: &str = "99-privguard-privilege-enforcement.conf";

/// Polkit directory holding layered `.conf` fragments.
pub const FRAGMENT_SUBDIR: &str = "localauthority.conf.d";

pub const DEFAULT_SUDOERS_DIR: &str = "/etc/sudoers.d";
pub const DEFAULT_POLICYKIT_DIR: &str = "/etc/polkit-1";

pub const GENERATED_HEADER: &str = "# This file is managed by privguard.
# Do not edit this file manually.
# Any changes will be overwritten.

";
