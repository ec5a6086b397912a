//! Host header validation against ALLOWED_HOSTS

/// Hosts accepted in debug mode when ALLOWED_HOSTS is empty
const DEBUG_HOSTS: [&str; 4] = [".localhost", "localhost", "127.0.0.1", "[::1]"];

/// Strip the port from a Host header value and lowercase it
pub fn split_domain(host: &str) -> String {
    let host = host.trim().to_lowercase();
    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop anything after them
        return match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => String::new(),
        };
    }
    let domain = match host.rsplit_once(':') {
        Some((domain, port)) if port.chars().all(|c| c.is_ascii_digit()) => domain,
        Some(_) => "",
        None => host.as_str(),
    };
    domain.trim_end_matches('.').to_string()
}

/// Whether `domain` matches a single ALLOWED_HOSTS pattern
pub fn matches_pattern(domain: &str, pattern: &str) -> bool {
    let pattern = pattern.to_lowercase();
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('.') {
        return domain == suffix || domain.ends_with(&pattern);
    }
    !domain.is_empty() && domain == pattern
}

/// Validate a raw Host header value
pub fn is_allowed_host(host: &str, allowed: &[String], debug: bool) -> bool {
    let domain = split_domain(host);
    if allowed.is_empty() {
        return debug && DEBUG_HOSTS.iter().any(|p| matches_pattern(&domain, p));
    }
    allowed.iter().any(|p| matches_pattern(&domain, p))
}
