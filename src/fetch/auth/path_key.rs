use crate::fetch::HttpClient;
use async_trait::async_trait;
use std::fmt;

/// An [`HttpClient`] wrapper that inserts an API key as a URL path segment.
///
/// The key goes directly before the final segment, so
/// `{base}/{lat},{lon},{time}` is sent as `{base}/{key}/{lat},{lon},{time}`.
/// Query parameters are left untouched.
pub struct PathKey<C> {
    pub inner: C,
    pub key: String,
}

impl<C> PathKey<C> {
    pub fn new(inner: C, key: impl Into<String>) -> Self {
        Self {
            inner,
            key: key.into(),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for PathKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathKey")
            .field("inner", &self.inner)
            .field("key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for PathKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let url = req.url_mut();
        let path = url.path().to_string();
        let keyed = match path.rsplit_once('/') {
            Some((head, last)) => format!("{head}/{}/{last}", self.key),
            None => format!("/{}/{path}", self.key),
        };
        url.set_path(&keyed);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_key_precedes_final_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast/s3cret/40.7,-74,2019-05-13T00:00:00"))
            .and(query_param("exclude", "daily"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = PathKey::new(BasicClient::new(Duration::from_secs(5)).unwrap(), "s3cret");
        let url = format!(
            "{}/forecast/40.7,-74,2019-05-13T00:00:00?exclude=daily",
            server.uri()
        );
        let req = reqwest::Request::new(reqwest::Method::GET, url.parse().unwrap());
        let resp = client.execute(req).await.unwrap();
        assert!(resp.status().is_success());
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = PathKey::new("inner", "s3cret");
        assert!(!format!("{client:?}").contains("s3cret"));
    }
}
