//! Client-IP resolution, adapted from the teacher's `utils::request`.

use http::HeaderName;
use once_cell::sync::Lazy;
use pingora_proxy::Session;

static HTTP_HEADER_X_FORWARDED_FOR: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-forwarded-for"));

static HTTP_HEADER_X_REAL_IP: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("x-real-ip"));

/// Gets the client's apparent IP address based on common proxy headers or
/// the direct connection address.
///
/// Precedence: `X-Forwarded-For` (first IP in the list), then
/// `X-Real-IP`, then the direct client address. Returns an empty string if
/// no IP address can be determined.
pub fn get_client_ip(session: &Session) -> String {
    if let Some(value) = session.get_header(HTTP_HEADER_X_FORWARDED_FOR.clone()) {
        if let Ok(forwarded) = value.to_str() {
            if let Some(ip) = forwarded.split(',').next() {
                let trimmed_ip = ip.trim();
                if !trimmed_ip.is_empty() {
                    return trimmed_ip.to_string();
                }
            }
        }
    }

    if let Some(value) = session.get_header(HTTP_HEADER_X_REAL_IP.clone()) {
        if let Ok(real_ip) = value.to_str() {
            let trimmed_ip = real_ip.trim();
            if !trimmed_ip.is_empty() {
                return trimmed_ip.to_string();
            }
        }
    }

    if let Some(addr) = session.client_addr() {
        return addr
            .as_inet()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();
    }

    log::debug!("Could not determine client IP address");
    String::new()
}
