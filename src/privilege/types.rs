use std::fmt;

use super::GENERATED_HEADER;

/// Policy keys understood by the compiler. Anything else is kept as `Unknown`
/// so it can be reported, and is otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKey {
    AllowLocalAdmins,
    ClientAdmins,
    Unknown(String),
}

impl EntryKey {
    pub fn as_str(&self) -> &str {
        match self {
            EntryKey::AllowLocalAdmins => "allow-local-admins",
            EntryKey::ClientAdmins => "client-admins",
            EntryKey::Unknown(key) => key,
        }
    }
}

impl From<&str> for EntryKey {
    fn from(key: &str) -> Self {
        match key {
            "allow-local-admins" => EntryKey::AllowLocalAdmins,
            "client-admins" => EntryKey::ClientAdmins,
            other => EntryKey::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One directive from the directory-service policy set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub key: EntryKey,
    /// Raw payload, only meaningful for `client-admins`.
    pub value: String,
    pub disabled: bool,
}

impl PolicyEntry {
    pub fn new(key: &str, value: impl Into<String>, disabled: bool) -> Self {
        Self {
            key: EntryKey::from(key),
            value: value.into(),
            disabled,
        }
    }
}

/// A normalized user (`name`) or group (`%name`) identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    name: String,
    group: bool,
}

impl Identity {
    /// Parses an already normalized token. Returns `None` for an empty name.
    pub fn parse(token: &str) -> Option<Self> {
        let (name, group) = match token.strip_prefix('%') {
            Some(rest) => (rest, true),
            None => (token, false),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            group,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_group(&self) -> bool {
        self.group
    }

    /// Identity in polkit dialect: `unix-user:NAME` or `unix-group:NAME`.
    pub fn polkit_id(&self) -> String {
        if self.group {
            format!("unix-group:{}", self.name)
        } else {
            format!("unix-user:{}", self.name)
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group {
            write!(f, "%{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Directive lines contributed by a single policy entry.
pub type RuleBlock = Vec<String>;

/// Whether, and with which value, the authorization fragment should exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDocument {
    /// No override: the host's default administrator identities apply.
    Absent,
    /// Local admins are kept, so the system identities lead the granted ones.
    Merged {
        system: String,
        granted: Vec<String>,
    },
    /// Local admins are revoked; only explicitly granted identities remain.
    ExplicitOnly { granted: Vec<String> },
}

impl AuthorizationDocument {
    /// The `AdminIdentities` value, or `None` when the file must not exist.
    pub fn admin_identities(&self) -> Option<String> {
        match self {
            AuthorizationDocument::Absent => None,
            AuthorizationDocument::Merged { system, granted } => {
                let granted = granted.join(";");
                if system.is_empty() {
                    Some(granted)
                } else {
                    Some(format!("{system};{granted}"))
                }
            }
            AuthorizationDocument::ExplicitOnly { granted } => Some(granted.join(";")),
        }
    }

    pub fn render(&self) -> Option<String> {
        self.admin_identities().map(|ids| {
            format!("{GENERATED_HEADER}[Configuration]\nAdminIdentities={ids}\n")
        })
    }
}

/// Both documents produced from one entry list, before anything touches disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPolicy {
    pub rule_blocks: Vec<RuleBlock>,
    pub authorization: AuthorizationDocument,
}

impl CompiledPolicy {
    /// All directive lines in order, without block separators.
    pub fn escalation_rules(&self) -> impl Iterator<Item = &str> {
        self.rule_blocks
            .iter()
            .flat_map(|block| block.iter().map(String::as_str))
    }

    /// Sudoers content: header, then each block followed by a blank line.
    pub fn render_escalation_rules(&self) -> String {
        let mut out = String::from(GENERATED_HEADER);
        for block in &self.rule_blocks {
            for line in block {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}
