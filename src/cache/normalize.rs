//! Query normalization.
//!
//! Every backend derives its keys from [`normalize`]; two inputs naming the
//! same tool modulo URL scheme, `www.`, case or punctuation must land on the
//! same string or the cache fragments silently.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9 \-]").expect("static pattern is valid"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern is valid"));

/// Suffixes dropped from a bare `name.suffix` host, so that `gitlab.com`
/// and `GitLab` share an entry.
const GENERIC_SUFFIXES: &[&str] = &["com", "io", "net", "org", "dev", "app", "ai", "co"];

/// Canonicalize a free-text query into its cache lookup form.
///
/// Total and idempotent: `normalize(&normalize(q)) == normalize(q)`.
pub fn normalize(query: &str) -> String {
    let lowered = query.trim().to_lowercase();

    let reduced = match host_of(&lowered) {
        Some(host) => host,
        None => lowered,
    };

    let stripped = strip_prefixes(&reduced);
    let replaced = DISALLOWED.replace_all(stripped, " ");
    WHITESPACE.replace_all(&replaced, " ").trim().to_string()
}

/// Host of `input` if it reads as a URL or bare domain, `www.` removed.
fn host_of(input: &str) -> Option<String> {
    // Free text never goes through the URL parser; only tokens shaped like
    // `scheme://...` or `name.tld` do.
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return None;
    }
    if !input.contains('.') && !input.contains("://") {
        return None;
    }

    let has_scheme = input.contains("://");
    let parsed = Url::parse(input)
        .ok()
        .filter(|url| url.host_str().is_some_and(|h| !h.is_empty()))
        .or_else(|| {
            if has_scheme {
                None
            } else {
                Url::parse(&format!("https://{input}")).ok()
            }
        })?;

    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(strip_generic_suffix(host).to_string())
}

fn strip_generic_suffix(host: &str) -> &str {
    match host.rsplit_once('.') {
        Some((name, suffix))
            if !name.is_empty() && !name.contains('.') && GENERIC_SUFFIXES.contains(&suffix) =>
        {
            name
        }
        _ => host,
    }
}

fn strip_prefixes(value: &str) -> &str {
    let mut rest = value;
    for scheme in ["https://", "http://"] {
        if let Some(tail) = rest.strip_prefix(scheme) {
            rest = tail;
            break;
        }
    }
    rest = rest.strip_prefix("www.").unwrap_or(rest);
    rest.strip_suffix('/').unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_and_case_invariance() {
        assert_eq!(normalize("HTTPS://WWW.Example.com/"), normalize("example.com"));
        assert_eq!(normalize("http://example.com"), normalize("Example.COM"));
    }

    #[test]
    fn test_bare_domain_matches_product_name() {
        assert_eq!(normalize("gitlab.com"), "gitlab");
        assert_eq!(normalize("GitLab"), "gitlab");
        assert_eq!(normalize("https://gitlab.com/pricing/"), "gitlab");
        assert_eq!(normalize("www.notion.so"), "notion so");
    }

    #[test]
    fn test_multi_label_host_keeps_labels() {
        assert_eq!(normalize("https://docs.example.co.uk/a/b"), "docs example co uk");
        assert_eq!(normalize("api.slack.com"), "api slack com");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(normalize("  Is   Zoom   safe?? "), "is zoom safe");
        assert_eq!(normalize("1Password (Teams)"), "1password teams");
        assert_eq!(normalize("vs-code\tremote\nssh"), "vs-code remote ssh");
        assert_eq!(normalize("Ünïcode"), "n code");
    }

    #[test]
    fn test_free_text_with_url_is_not_reduced() {
        assert_eq!(normalize("is gitlab.com safe"), "is gitlab com safe");
    }

    #[test]
    fn test_malformed_url_falls_back() {
        assert_eq!(normalize("http://"), "");
        assert_eq!(normalize("https://[broken"), "broken");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "HTTPS://WWW.Example.com/",
            "gitlab.com",
            "GitLab",
            "  Is   Zoom   safe?? ",
            "https://docs.example.co.uk/a/b",
            "http://",
            "https://[broken",
            "mailto:security@example.com",
            "Ünïcode",
            "127.0.0.1:8080",
            "www.",
            "-- slack --",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    mod properties {
        use crate::cache::normalize::normalize;
        use proptest::prelude::*;

        fn url_like() -> impl Strategy<Value = String> {
            (
                prop::sample::select(vec!["", "http://", "https://", "HTTPS://", "ftp://", "mailto:"]),
                prop::sample::select(vec!["", "www.", "WWW."]),
                "[a-zA-Z0-9-]{0,12}",
                prop::sample::select(vec!["", ".com", ".io", ".so", ".co.uk", ".", ".."]),
                "(/[a-zA-Z0-9?#=&%.-]{0,8}){0,3}",
            )
                .prop_map(|(scheme, www, name, suffix, path)| {
                    format!("{scheme}{www}{name}{suffix}{path}")
                })
        }

        proptest! {
            #[test]
            fn prop_idempotent_on_any_string(query in any::<String>()) {
                let once = normalize(&query);
                prop_assert_eq!(normalize(&once), once);
            }

            #[test]
            fn prop_idempotent_on_url_like(query in url_like()) {
                let once = normalize(&query);
                prop_assert_eq!(normalize(&once), once);
            }

            #[test]
            fn prop_output_alphabet(query in any::<String>()) {
                let out = normalize(&query);
                prop_assert!(out
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' || c == '-'));
                prop_assert!(!out.starts_with(' ') && !out.ends_with(' ') && !out.contains("  "));
            }
        }
    }
}
