//! Registration API served on an ephemeral port.

use slirc_relay::http;
use slirc_relay::pool::ConnectionPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestApi {
    pub base: String,
    pub client: reqwest::Client,
    task: JoinHandle<()>,
}

impl TestApi {
    pub async fn spawn(pool: Arc<ConnectionPool>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base = format!("http://{}", listener.local_addr()?);
        let app = http::router(pool, true);
        let task = tokio::spawn(async move {
            let _ = http::serve(listener, app).await;
        });
        Ok(Self {
            base,
            client: reqwest::Client::new(),
            task,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// POST a raw body, returning status and parsed JSON (`Null` if none).
    pub async fn post_raw(&self, path: &str, body: &str) -> anyhow::Result<(u16, serde_json::Value)> {
        let resp = self
            .client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let json = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        Ok((status, json))
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> anyhow::Result<(u16, serde_json::Value)> {
        self.post_raw(path, &body.to_string()).await
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.task.abort();
    }
}
