//! Route decomposition against a set of registered domains.

use crate::errors::{ClientError, Result};

/// A registered domain, by id and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSummary {
    /// Domain identifier.
    pub id: String,
    /// Domain name, e.g. `apps.example.com`.
    pub name: String,
}

/// A route split into its host, domain, path and port components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecomposedRoute {
    /// Leading labels of the route, if any, joined by dots.
    pub host: Option<String>,
    /// The most specific matching registered domain.
    pub domain: DomainSummary,
    /// Path component, if the route carried one.
    pub path: Option<String>,
    /// Port, if the route carried one.
    pub port: Option<u16>,
}

/// Splits a route into host and domain against the registered domains.
///
/// A domain matches when it equals the route's hostname or is a suffix of it
/// on a label boundary; among matches, the one with the most dot-separated
/// labels wins. The result is deterministic regardless of the order of
/// `domains`. Optional userinfo, port and path are stripped from the route
/// before matching and reported back in the result.
pub fn decompose_route(domains: &[DomainSummary], route: &str) -> Result<DecomposedRoute> {
    let (authority, path) = match route.find('/') {
        Some(index) => (&route[..index], Some(route[index..].to_string())),
        None => (route, None),
    };

    let authority = match authority.rsplit_once('@') {
        Some((_userinfo, host)) => host,
        None => authority,
    };

    let (hostname, port) = match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, port.parse::<u16>().ok())
        }
        _ => (authority, None),
    };

    let mut best: Option<&DomainSummary> = None;
    for domain in domains {
        let matches = hostname == domain.name
            || (hostname.len() > domain.name.len()
                && hostname.ends_with(&domain.name)
                && hostname.as_bytes()[hostname.len() - domain.name.len() - 1] == b'.');
        if !matches {
            continue;
        }

        let labels = domain.name.split('.').count();
        if best.map_or(true, |current| labels > current.name.split('.').count()) {
            best = Some(domain);
        }
    }

    let domain = best.ok_or_else(|| {
        ClientError::configuration(format!(
            "The route {} did not match any existing domains",
            route
        ))
    })?;

    let host = if hostname == domain.name {
        None
    } else {
        Some(hostname[..hostname.len() - domain.name.len() - 1].to_string())
    };

    Ok(DecomposedRoute {
        host,
        domain: domain.clone(),
        path,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn domains(names: &[&str]) -> Vec<DomainSummary> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| DomainSummary {
                id: index.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    #[test_case(&["domain.com", "sub1.sub2.domain.com"], "myhost.sub1.sub2.domain.com", Some("myhost"), "sub1.sub2.domain.com"; "most specific suffix wins")]
    #[test_case(&["sub1.sub2.domain.com", "domain.com"], "myhost.sub1.sub2.domain.com", Some("myhost"), "sub1.sub2.domain.com"; "independent of registration order")]
    #[test_case(&["foo.bar.com", "anotherdomain.com"], "bang.foo.bar.com:8181", Some("bang"), "foo.bar.com"; "port is stripped before matching")]
    #[test_case(&["foo.bar.com"], "admin@bang.foo.bar.com", Some("bang"), "foo.bar.com"; "userinfo is stripped before matching")]
    #[test_case(&["test.com", "test.test.com"], "test.test.com", None, "test.test.com"; "exact match has no host")]
    fn decomposes(
        registered: &[&str],
        route: &str,
        expected_host: Option<&str>,
        expected_domain: &str,
    ) {
        let decomposed = decompose_route(&domains(registered), route).unwrap();

        assert_eq!(decomposed.host.as_deref(), expected_host);
        assert_eq!(decomposed.domain.name, expected_domain);
    }

    #[test]
    fn captures_port_and_path() {
        let decomposed =
            decompose_route(&domains(&["foo.bar.com"]), "bang.foo.bar.com:8181/some/path")
                .unwrap();

        assert_eq!(decomposed.port, Some(8181));
        assert_eq!(decomposed.path.as_deref(), Some("/some/path"));
    }

    #[test]
    fn suffix_match_respects_label_boundaries() {
        // "hing.com" is a string suffix of "thing.com" but not a domain match.
        let result = decompose_route(
            &domains(&["test.something.com", "something.com", "hing.com"]),
            "thing.com",
        );

        assert!(matches!(result, Err(ClientError::Configuration { .. })));
    }

    #[test]
    fn unmatched_route_is_an_error_naming_the_route() {
        let error = decompose_route(&domains(&[]), "test.test.com").unwrap_err();
        assert!(error
            .to_string()
            .contains("The route test.test.com did not match any existing domains"));
    }
}
