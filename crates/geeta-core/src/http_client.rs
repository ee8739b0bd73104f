//! HTTP Client Factory
//!
//! Shared builder for the outbound retrieval and completion clients.

use std::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a `reqwest::Client` with a bounded connect phase.
///
/// The builder only fails when the TLS backend cannot initialise, which
/// `reqwest::Client::new` treats as fatal as well.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let _client = build_http_client();
    }
}
