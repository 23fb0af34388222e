use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared blocking client for the token endpoint and the management APIs.
pub static BLOCKING_CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    let builder = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("firebase-setup/", env!("CARGO_PKG_VERSION")));
    // Test servers listen on loopback and must be reached directly.
    #[cfg(test)]
    let builder = builder.no_proxy();
    builder
        .build()
        .expect("failed to build blocking reqwest client")
});
