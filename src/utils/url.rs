//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing base URLs and deriving
//! the WebSocket endpoint from the HTTP API endpoint.

/// Normalize a base URL by removing trailing slashes
///
/// This ensures consistent URL construction when appending endpoints,
/// preventing double slashes in the final URLs.
///
/// # Examples
///
/// ```
/// use causerie::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com"), "https://api.example.com");
/// assert_eq!(normalize_base_url("https://api.example.com/"), "https://api.example.com");
/// assert_eq!(normalize_base_url("https://api.example.com///"), "https://api.example.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path
///
/// # Examples
///
/// ```
/// use causerie::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com", "chats"),
///     "https://api.example.com/chats"
/// );
/// assert_eq!(
///     construct_api_url("https://api.example.com/", "/chats"),
///     "https://api.example.com/chats"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Derive the WebSocket endpoint from an HTTP base URL
///
/// `http://` becomes `ws://` and `https://` becomes `wss://`. URLs that
/// already carry a WebSocket scheme pass through unchanged.
///
/// # Examples
///
/// ```
/// use causerie::utils::url::derive_socket_url;
///
/// assert_eq!(derive_socket_url("https://api.example.com"), "wss://api.example.com");
/// assert_eq!(derive_socket_url("http://localhost:8080/"), "ws://localhost:8080");
/// ```
pub fn derive_socket_url(base_url: &str) -> String {
    let normalized = normalize_base_url(base_url);
    if let Some(rest) = normalized.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = normalized.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        normalized
    }
}
