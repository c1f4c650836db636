//! Stateless origin authorization.

use url::Url;

use super::types::{TrustDecision, TrustError, TrustedDomainEntry};

/// Actions allowed without trust, so an untrusted caller can ask to be trusted.
pub const BYPASS_ACTIONS: &[&str] = &["request_trust"];

/// Host part of an origin, without scheme, credentials, port or path.
///
/// Full origins and URLs are parsed with WHATWG semantics, so the host is
/// the one a browser would connect to, lowercased. A string without a
/// scheme is taken as a bare host. IPv6 hosts keep their brackets.
pub fn extract_host(origin: &str) -> Option<String> {
    let origin = origin.trim();
    if origin.contains("://") {
        let url = Url::parse(origin).ok()?;
        return url.host_str().filter(|h| !h.is_empty()).map(str::to_string);
    }
    // Bare host: parse it as the authority of a synthetic URL.
    if origin.is_empty() || origin.contains(['/', '\\', '@', '?', '#']) {
        return None;
    }
    let url = Url::parse(&format!("http://{}", origin)).ok()?;
    url.host_str().filter(|h| !h.is_empty()).map(str::to_string)
}

/// Whether `host` is admitted by `pattern`.
///
/// `*.suffix` admits any host ending in `.suffix`, and never `suffix`
/// itself. A wildcard over a single label (`*.app`) admits nothing.
/// Anything else must match exactly.
pub fn pattern_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) if suffix.starts_with('.') => {
            is_multi_label(&suffix[1..]) && host.ends_with(suffix)
        }
        _ => pattern == host,
    }
}

fn is_multi_label(domain: &str) -> bool {
    domain.split('.').filter(|label| !label.is_empty()).count() >= 2
}

/// Reject patterns the gate cannot match meaningfully.
pub fn validate_pattern(pattern: &str) -> Result<(), TrustError> {
    let invalid = |why: &str| Err(TrustError::InvalidPattern(format!("{} ({})", pattern, why)));

    if pattern.is_empty() {
        return invalid("empty");
    }
    if pattern.chars().any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | ':' | '@' | '?' | '#')) {
        return invalid("host only, no scheme, port or path");
    }
    if pattern.chars().any(|c| c.is_ascii_uppercase()) {
        return invalid("hosts are matched lowercased");
    }
    let body = pattern.strip_prefix("*.").unwrap_or(pattern);
    if body.is_empty() || body.contains('*') {
        return invalid("wildcard only allowed as leading \"*.\"");
    }
    if body.starts_with('.') || body.ends_with('.') || body.contains("..") {
        return invalid("malformed labels");
    }
    if pattern.starts_with("*.") && !is_multi_label(body) {
        return invalid("wildcard must cover at least two labels");
    }
    Ok(())
}

/// Decide whether `origin` may perform `action`.
pub fn is_authorized(
    origin: Option<&str>,
    action: &str,
    entries: &[TrustedDomainEntry],
) -> TrustDecision {
    if BYPASS_ACTIONS.contains(&action) {
        return TrustDecision::Bypassed;
    }

    let Some(host) = origin.and_then(extract_host) else {
        return TrustDecision::Denied {
            host: None,
            reason: "request has no origin".to_string(),
        };
    };

    match entries
        .iter()
        .find(|entry| pattern_matches(&entry.domain_pattern, &host))
    {
        Some(entry) => TrustDecision::Allowed {
            host,
            entry_id: entry.id.clone(),
        },
        None => TrustDecision::Denied {
            reason: format!("origin {} is not trusted", host),
            host: Some(host),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(patterns: &[&str]) -> Vec<TrustedDomainEntry> {
        patterns
            .iter()
            .enumerate()
            .map(|(i, p)| TrustedDomainEntry {
                id: format!("e{}", i),
                domain_pattern: p.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_extract_host() {
        let host = |origin: &str| extract_host(origin);
        assert_eq!(host("https://a.multipost.app").as_deref(), Some("a.multipost.app"));
        assert_eq!(host("https://a.multipost.app:8443/x?y").as_deref(), Some("a.multipost.app"));
        assert_eq!(host("http://user:pw@host.example/").as_deref(), Some("host.example"));
        assert_eq!(host("multipost.app").as_deref(), Some("multipost.app"));
        assert_eq!(host("localhost:5173").as_deref(), Some("localhost"));
        assert_eq!(host("http://[::1]:3000").as_deref(), Some("[::1]"));
        assert_eq!(host("https://"), None);
        assert_eq!(host(""), None);
        assert_eq!(host("evil.com/@a.multipost.app"), None);
    }

    #[test]
    fn test_wildcard_admits_subdomain() {
        let trusted = entries(&["*.multipost.app"]);
        let decision = is_authorized(Some("https://a.multipost.app"), "publish", &trusted);
        assert_eq!(
            decision,
            TrustDecision::Allowed {
                host: "a.multipost.app".to_string(),
                entry_id: "e0".to_string()
            }
        );
    }

    #[test]
    fn test_wildcard_rejects_lookalike() {
        let trusted = entries(&["*.multipost.app"]);
        let decision = is_authorized(Some("https://multipostapp.evil.com"), "publish", &trusted);
        assert!(!decision.is_allowed());
    }

    #[test]
    fn test_wildcard_does_not_admit_apex() {
        assert!(!pattern_matches("*.multipost.app", "multipost.app"));
        assert!(!pattern_matches("*.app", "multipost.app"));
        assert!(!pattern_matches("*.app", "a.multipost.app"));
        assert!(!is_authorized(Some("https://multipost.app"), "publish", &entries(&["*.app"]))
            .is_allowed());
    }

    #[test]
    fn test_backslash_userinfo_resolves_like_a_browser() {
        // WHATWG treats `\` as a path separator in special schemes.
        let origin = "https://evil.com\\@a.multipost.app/";
        assert_eq!(extract_host(origin).as_deref(), Some("evil.com"));
        let decision = is_authorized(Some(origin), "publish", &entries(&["*.multipost.app"]));
        assert_eq!(
            decision,
            TrustDecision::Denied {
                host: Some("evil.com".to_string()),
                reason: "origin evil.com is not trusted".to_string(),
            }
        );
    }

    #[test]
    fn test_apex_requires_exact_entry() {
        assert!(is_authorized(
            Some("https://multipost.app"),
            "publish",
            &entries(&["multipost.app"])
        )
        .is_allowed());
        assert!(!is_authorized(
            Some("https://multipost.app"),
            "publish",
            &entries(&["*.multipost.app"])
        )
        .is_allowed());
    }

    #[test]
    fn test_host_is_lowercased_before_matching() {
        let trusted = entries(&["multipost.app"]);
        assert!(is_authorized(Some("https://MultiPost.app"), "publish", &trusted).is_allowed());
        assert!(is_authorized(Some("MULTIPOST.APP"), "publish", &trusted).is_allowed());
    }

    #[test]
    fn test_port_and_scheme_are_ignored() {
        let trusted = entries(&["localhost"]);
        assert!(is_authorized(Some("http://localhost:5173"), "ping", &trusted).is_allowed());
        assert!(is_authorized(Some("chrome-extension://localhost"), "ping", &trusted).is_allowed());
    }

    #[test]
    fn test_bypass_action_skips_check() {
        assert_eq!(
            is_authorized(None, "request_trust", &[]),
            TrustDecision::Bypassed
        );
    }

    #[test]
    fn test_missing_origin_denied() {
        let decision = is_authorized(None, "publish", &entries(&["*.multipost.app"]));
        assert!(matches!(decision, TrustDecision::Denied { host: None, .. }));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("multipost.app").is_ok());
        assert!(validate_pattern("*.multipost.app").is_ok());
        assert!(validate_pattern("localhost").is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("*").is_err());
        assert!(validate_pattern("*.").is_err());
        assert!(validate_pattern("*.app").is_err());
        assert!(validate_pattern("a.*.app").is_err());
        assert!(validate_pattern("https://a.app").is_err());
        assert!(validate_pattern("a.app:80").is_err());
        assert!(validate_pattern("MultiPost.app").is_err());
    }
}
