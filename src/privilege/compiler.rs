use super::normalize::split_and_normalize;
use super::types::{AuthorizationDocument, CompiledPolicy, EntryKey, PolicyEntry, RuleBlock};

const DENY_ADMIN_GROUP: &str = "%admin\tALL=(ALL) !ALL";
const DENY_SUDO_GROUP: &str = "%sudo\tALL=(ALL:ALL) !ALL";

/// Running state of the entry walk.
#[derive(Debug, Clone)]
struct Accumulator {
    allow_local_admins: bool,
    rule_blocks: Vec<RuleBlock>,
    /// Identities of the last `client-admins` entry that granted anyone.
    polkit_identities: Option<Vec<String>>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            allow_local_admins: true,
            rule_blocks: Vec::new(),
            polkit_identities: None,
        }
    }
}

impl Accumulator {
    fn apply(mut self, entry: &PolicyEntry) -> Self {
        match &entry.key {
            EntryKey::AllowLocalAdmins => {
                self.allow_local_admins = !entry.disabled;
                if !self.allow_local_admins {
                    self.rule_blocks
                        .push(vec![DENY_ADMIN_GROUP.to_string(), DENY_SUDO_GROUP.to_string()]);
                }
            }
            EntryKey::ClientAdmins if entry.disabled => {}
            EntryKey::ClientAdmins => {
                let identities = split_and_normalize(&entry.value);
                if identities.is_empty() {
                    return self;
                }
                self.rule_blocks.push(
                    identities
                        .iter()
                        .map(|id| format!("\"{id}\"\tALL=(ALL:ALL) ALL"))
                        .collect(),
                );
                self.polkit_identities =
                    Some(identities.iter().map(|id| id.polkit_id()).collect());
            }
            EntryKey::Unknown(key) => {
                tracing::debug!(key = %key, "Ignoring unsupported privilege policy key");
            }
        }
        self
    }

    fn finish(self, system_admins: &str) -> CompiledPolicy {
        let authorization = match (self.allow_local_admins, self.polkit_identities) {
            (true, None) => AuthorizationDocument::Absent,
            (true, Some(granted)) => AuthorizationDocument::Merged {
                system: system_admins.to_string(),
                granted,
            },
            (false, granted) => AuthorizationDocument::ExplicitOnly {
                granted: granted.unwrap_or_default(),
            },
        };

        CompiledPolicy {
            rule_blocks: self.rule_blocks,
            authorization,
        }
    }
}

/// Compile an ordered entry list into sudoers rules and the polkit admin
/// override.
///
/// `system_admins` is the `AdminIdentities` value currently in effect from
/// foreign fragments; it is only kept when local admins stay allowed.
pub fn compile(entries: &[PolicyEntry], system_admins: &str) -> CompiledPolicy {
    entries
        .iter()
        .fold(Accumulator::default(), Accumulator::apply)
        .finish(system_admins)
}
