use url::Url;

/// Registrable root domain (eTLD+1) of a hostname, e.g. `example.com` for
/// `www.example.com`. `None` for IP addresses and unlisted suffixes.
#[must_use]
pub fn root_domain(host: &str) -> Option<&str> {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }
    psl::domain_str(host)
}

/// Decides whether a caller-supplied post-login redirect target is safe.
///
/// Rules, in order: targets that cannot be carried in a Location header are
/// rejected; a single-`/` relative path is safe; a target whose hostname
/// cannot be determined is not; hostnames sharing the auth origin's root
/// domain are safe; hostnames matching a trusted domain exactly or as a
/// proper subdomain are safe; everything else is rejected.
#[must_use]
pub fn is_safe(target: &str, origin: &Url, trusted_domains: &[String]) -> bool {
    // Location header values must not contain control characters
    if target.bytes().any(|b| b.is_ascii_control()) {
        return false;
    }

    if target.starts_with('/') && !target.starts_with("//") {
        return true;
    }

    let Some(host) = target_host(target) else {
        return false;
    };

    if let Some(origin_root) = origin.host_str().and_then(root_domain) {
        if root_domain(&host) == Some(origin_root) {
            return true;
        }
    }

    trusted_domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

fn target_host(target: &str) -> Option<String> {
    let parsed = match Url::parse(target) {
        Ok(url) => url,
        // scheme-relative targets like //evil.com still name a host
        Err(_) if target.starts_with("//") => Url::parse(&format!("http:{target}")).ok()?,
        Err(_) => return None,
    };
    parsed.host_str().map(str::to_owned)
}
