//! privguard - privilege escalation policy enforcement
//!
//! Compiles directory-service privilege entries into a sudoers fragment and a
//! polkit administrator override, and installs them on the host.
//! It exposes all modules for testing purposes.

pub mod privilege;
pub mod settings;
