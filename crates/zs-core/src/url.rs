//! Page URL to site resolution
//!
//! Host extraction works on slices of the URL; only the site lookup
//! allocates, to lowercase the host.

use crate::rules::{SiteRules, SITES};

// =============================================================================
// Host Extraction
// =============================================================================

/// Byte offset just past `scheme://`.
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    url[colon..].starts_with("://").then_some(colon + 3)
}

/// Byte span of the host, without userinfo or port.
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let authority_start = get_scheme_end(url)?;
    let rest = &url[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    let host_start = authority.rfind('@').map_or(0, |at| at + 1);
    let host_len = authority[host_start..].find(':').unwrap_or(authority.len() - host_start);

    let start = authority_start + host_start;
    Some((start, start + host_len))
}

/// Host of `url` as a slice of it; `None` for URLs without one.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (start, end) = get_host_position(url)?;
    Some(&url[start..end]).filter(|host| !host.is_empty())
}

// =============================================================================
// Suffix Walking
// =============================================================================

/// Iterator over a host and its parent domains, most specific first.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = result
            .find('.')
            .map(|dot| &result[dot + 1..])
            .filter(|parent| parent.contains('.'));
        Some(result)
    }
}

/// Walk `www.m.example.com`, `m.example.com`, `example.com`.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.trim_end_matches('.');
    HostSuffixIter {
        current: (!host.is_empty()).then_some(host),
    }
}

// =============================================================================
// Site Lookup
// =============================================================================

/// The site serving `host`, matched on the host or any parent domain.
pub fn site_for_host(host: &str) -> Option<&'static SiteRules> {
    let host = host.to_ascii_lowercase();
    walk_host_suffixes(&host).find_map(|suffix| {
        SITES
            .iter()
            .copied()
            .find(|site| site.domains.iter().any(|domain| *domain == suffix))
    })
}

/// The site serving the page at `url`.
pub fn site_for_url(url: &str) -> Option<&'static SiteRules> {
    site_for_host(extract_host(url)?)
}
