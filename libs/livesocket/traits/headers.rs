use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers to send with the WebSocket upgrade request
pub type Headers = HashMap<String, String>;

/// Trait for providing handshake headers dynamically
///
/// Called once per `connect`, so tokens obtained by an external OAuth flow
/// can be refreshed between connections.
///
/// # Example
/// ```ignore
/// struct BearerToken(String);
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for BearerToken {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = Headers::new();
///         headers.insert("Authorization".to_string(), format!("Bearer {}", self.0));
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers for the next connection attempt
    async fn get_headers(&self) -> Headers;
}

/// Header provider that always returns the same set of headers
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: Headers,
}

impl StaticHeaders {
    pub fn new(headers: Headers) -> Self {
        Self { headers }
    }

    /// Add a single header
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn get_headers(&self) -> Headers {
        self.headers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_headers_returned_every_call() {
        let provider = StaticHeaders::default()
            .with("Authorization", "Bearer abc")
            .with("Client-ID", "probe");

        for _ in 0..2 {
            let headers = provider.get_headers().await;
            assert_eq!(headers.len(), 2);
            assert_eq!(headers["Authorization"], "Bearer abc");
        }
    }
}
