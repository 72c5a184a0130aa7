use super::types::Identity;

/// Characters Windows forbids in account names, which therefore can't come
/// from the directory and would break the sudoers or polkit syntax.
const DISALLOWED_CHARS: &[char] = &['/', '[', ']', ':', '|', '<', '>', '=', ';', '?', '*', '%', '"'];

/// Split a raw `client-admins` value into normalized identities.
///
/// Identities may be given one per line, comma separated, or both. Invalid
/// characters are stripped, `domain\user` becomes `user@domain` and empty
/// tokens are dropped. Order and duplicates are preserved. Any rewrite is
/// reported as a warning and never fails.
pub fn split_and_normalize(raw: &str) -> Vec<Identity> {
    let flattened = raw.lines().collect::<Vec<_>>().join(",");

    flattened
        .split(',')
        .filter_map(|token| {
            let normalized = normalize_token(token);
            match &normalized {
                Some(identity) => {
                    let rewritten = identity.to_string();
                    if rewritten != token {
                        tracing::warn!(
                            original = token,
                            normalized = %rewritten,
                            "Changed user or group: invalid characters or domain\\user format"
                        );
                    }
                }
                None if !token.trim().is_empty() => {
                    tracing::warn!(original = token, "Dropped user or group with no valid name");
                }
                None => {}
            }
            normalized
        })
        .collect()
}

fn normalize_token(token: &str) -> Option<Identity> {
    let token = token.trim();
    let (is_group, body) = match token.strip_prefix('%') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !DISALLOWED_CHARS.contains(c) && !c.is_whitespace())
        .collect();

    let name = match cleaned.split_once('\\') {
        Some((_, user)) if user.replace('\\', "").is_empty() => return None,
        Some(("", user)) => user.replace('\\', ""),
        Some((domain, user)) => format!("{}@{domain}", user.replace('\\', "")),
        None => cleaned,
    };

    if is_group {
        Identity::parse(&format!("%{name}"))
    } else {
        Identity::parse(&name)
    }
}
