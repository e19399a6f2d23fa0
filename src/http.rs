// src/http.rs

//! Best-effort resolution of the client address behind proxies.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Returned when the peer address cannot be made sense of.
pub const LOOPBACK: &str = "127.0.0.1";

/// Resolves the client IP of a request.
///
/// Precedence: `X-Real-IP`, then the first entry of `X-Forwarded-For`, then
/// the host part of `remote_addr`, then [`LOOPBACK`] when `remote_addr` has no
/// usable host part. Header values are not validated as IP addresses.
pub fn remote_ip(headers: &HeaderMap, remote_addr: &str) -> String {
    if let Some(ip) = header_value(headers, X_REAL_IP) {
        return ip.to_string();
    }
    if let Some(ip) = header_value(headers, X_FORWARDED_FOR)
        .and_then(|list| list.split(',').map(str::trim).find(|s| !s.is_empty()))
    {
        return ip.to_string();
    }
    peer_host(remote_addr).unwrap_or_else(|| LOOPBACK.to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Extracts the host from `ip:port`, `[ipv6]:port`, a bare IP or a bare host.
fn peer_host(remote_addr: &str) -> Option<String> {
    if let Ok(addr) = remote_addr.parse::<SocketAddr>() {
        return Some(addr.ip().to_string());
    }
    if let Ok(ip) = remote_addr.trim().parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    let host = remote_addr.split(':').next().unwrap_or_default().trim();
    if host.is_empty() || host.starts_with('[') {
        return None;
    }
    Some(host.to_string())
}

/// Axum extractor for [`remote_ip`], using the connection's peer address when
/// the router was served with `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIp(pub String);

impl<S> FromRequestParts<S> for RemoteIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        Ok(RemoteIp(remote_ip(&parts.headers, &peer)))
    }
}
