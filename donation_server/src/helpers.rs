use std::{net::IpAddr, str::FromStr};

use actix_web::dev::ServiceRequest;
use log::{debug, trace};
use regex::Regex;

use crate::config::ServerOptions;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &ServiceRequest, options: ServerOptions) -> Option<IpAddr> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from);
    let peer_addr = req.connection_info().peer_addr().map(String::from);
    remote_ip_from_parts(header("X-Forwarded-For"), header("Forwarded"), peer_addr, options)
}

fn remote_ip_from_parts(
    x_forwarded_for: Option<String>,
    forwarded: Option<String>,
    peer_addr: Option<String>,
    options: ServerOptions,
) -> Option<IpAddr> {
    let mut result = None;
    if options.use_x_forwarded_for {
        trace!("💻️ Checking X-Forwarded-For header");
        // The first entry is the original client; proxies append themselves
        result = x_forwarded_for
            .as_deref()
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("💻️ Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if options.use_forwarded && result.is_none() {
        trace!("💻️ Checking Forwarded header");
        result = forwarded.as_deref().and_then(forwarded_for);
        if let Some(ip) = result {
            debug!("💻️ Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        trace!("💻️ Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

/// Extracts the `for=` address from an RFC 7239 `Forwarded` header value.
fn forwarded_for(value: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"(?i)for="?\[?(?P<ip>[0-9a-fA-F.:]+?)\]?(:\d+)?"?(;|,|$)"#).ok()?;
    re.captures(value).and_then(|caps| caps.name("ip")).and_then(|m| IpAddr::from_str(m.as_str()).ok())
}
