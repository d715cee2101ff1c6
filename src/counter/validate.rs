//! Domain and project identifier validation
//!
//! Everything here is pure: no I/O, no logging. Callers decide how a rejected
//! identifier is reported.

use crate::config::CounterPolicy;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_PROJECT_LEN: usize = 80;

/// Result of normalizing an optional project parameter
///
/// `Absent` and `Invalid` are kept apart: a caller that passed nothing asked
/// for domain-level counters, a caller that passed garbage gets a client error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectParam {
    Absent,
    Valid(String),
    Invalid,
}

/// Lowercase and trim a domain, rejecting anything outside `[a-z0-9.-]{1,253}`
pub fn normalize_domain(raw: &str) -> Option<String> {
    let domain = raw.trim().to_lowercase();

    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return None;
    }

    let allowed = domain
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-');

    allowed.then_some(domain)
}

/// Normalize an optional project key
///
/// One leading and one trailing `/` are stripped so that path-like keys such
/// as `/blog/` map onto `blog`.
pub fn normalize_project(raw: Option<&str>) -> ProjectParam {
    let trimmed = match raw.map(str::trim) {
        None | Some("") => return ProjectParam::Absent,
        Some(s) => s,
    };

    let stripped = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let stripped = stripped.strip_suffix('/').unwrap_or(stripped);
    let project = stripped.to_lowercase();

    if is_valid_project_key(&project) {
        ProjectParam::Valid(project)
    } else {
        ProjectParam::Invalid
    }
}

fn is_valid_project_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    let Some((first, rest)) = bytes.split_first() else {
        return false;
    };

    if bytes.len() > MAX_PROJECT_LEN {
        return false;
    }

    let head_ok = first.is_ascii_lowercase() || first.is_ascii_digit();
    let tail_ok = rest.iter().all(|b| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(*b, b'.' | b'_' | b'-')
    });

    head_ok && tail_ok
}

/// Check a normalized domain against the allow-list
///
/// A domain is allowed when it equals a configured root or is a subdomain of
/// one. `example.com` therefore admits `blog.example.com` but not
/// `badexample.com`.
pub fn is_allowed_domain(domain: &str, policy: &CounterPolicy) -> bool {
    if policy.allow_all {
        return true;
    }

    policy.allowed_root_domains.iter().any(|root| {
        domain == root
            || domain
                .strip_suffix(root.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
