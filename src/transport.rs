//! The HTTP capability the rest of the crate talks through.
//!
//! Everything that goes over the wire is behind [`Transport`] so job polling,
//! catalog resolution and downloads can be driven by a scripted fake in tests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::{config::Config, error::Result, Error};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Authenticated GET returning a JSON body. Non-success statuses are errors.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value>;

    /// GET returning only the status code.
    async fn status(&self, url: &str) -> Result<u16>;

    /// GET returning a text body. Non-success statuses are errors.
    async fn get_text(&self, url: &str) -> Result<String>;

    /// GET returning a raw body. Non-success statuses are errors.
    async fn get_bytes(&self, url: &str) -> Result<Bytes>;
}

/// [`Transport`] over reqwest with optional basic auth.
///
/// `read_timeout` bounds each read, not the whole transfer, so a large file
/// that keeps streaming is never cut off.
pub struct HttpTransport {
    client: Client,
    auth: Option<(String, String)>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        let auth = match (&config.username, &config.token) {
            (Some(username), Some(token)) => Some((username.clone(), token.clone())),
            _ => None,
        };

        Ok(HttpTransport { client, auth })
    }

    /// Fails with [`Error::Credentials`] unless both username and token are set.
    pub fn authenticated(config: &Config) -> Result<Self> {
        let transport = Self::new(config)?;
        if transport.auth.is_none() {
            return Err(Error::Credentials);
        }
        Ok(transport)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.auth {
            Some((username, token)) => request.basic_auth(username, Some(token)),
            None => request,
        }
    }

    async fn checked(&self, request: RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        debug!(url, "GET json");
        let request = self.get(url).query(query);
        let response = self.checked(request, url).await?;
        Ok(response.json().await?)
    }

    async fn status(&self, url: &str) -> Result<u16> {
        let response = self.get(url).send().await?;
        Ok(response.status().as_u16())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!(url, "GET text");
        let response = self.checked(self.get(url), url).await?;
        Ok(response.text().await?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        debug!(url, "GET bytes");
        let response = self.checked(self.get(url), url).await?;
        Ok(response.bytes().await?)
    }
}

// -- Test fake ---------------------------------------------------------------


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Serves one response whose body arrives in `chunks` pieces, `gap` apart.
    async fn slow_server(chunks: usize, gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                chunks
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            for _ in 0..chunks {
                tokio::time::sleep(gap).await;
                if socket.write_all(b"x").await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
        });

        format!("http://{}/deployment0001.nc", addr)
    }

    fn transport(read_timeout: Duration) -> HttpTransport {
        HttpTransport::new(&Config {
            read_timeout,
            ..Config::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn should_keep_reading_a_slow_but_steady_body() {
        let url = slow_server(8, Duration::from_millis(100)).await;

        let body = transport(Duration::from_millis(400)).get_bytes(&url).await.unwrap();

        assert_eq!(body, Bytes::from_static(b"xxxxxxxx"));
    }

    #[tokio::test]
    async fn should_give_up_on_a_stalled_body() {
        let url = slow_server(1, Duration::from_millis(1_500)).await;

        let result = transport(Duration::from_millis(300)).get_bytes(&url).await;

        assert!(matches!(result, Err(Error::Http(_))));
    }
}
