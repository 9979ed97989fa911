// ===============================
// src/testutil.rs (test-only)
// ===============================
//
// Tiny HTTP responder for feed/scheduler tests, same idea as the metrics
// responder: read one request, answer, close.
//
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

#[derive(Clone)]
pub struct Route {
    /// substring of the request target (path + query)
    pub pattern: &'static str,
    pub status: u16,
    pub body: String,
    pub delay_ms: u64,
}

impl Route {
    pub fn ok(pattern: &'static str, body: impl Into<String>) -> Self {
        Self { pattern, status: 200, body: body.into(), delay_ms: 0 }
    }
    pub fn status(pattern: &'static str, status: u16) -> Self {
        Self { pattern, status, body: "{}".into(), delay_ms: 0 }
    }
    pub fn delayed(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

pub struct TestServer {
    pub base: String,
    /// request targets that matched a route, in arrival order
    hits: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let hits_srv = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let routes = routes.clone();
                let hits = hits_srv.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    let req = String::from_utf8_lossy(&buf[..n]).to_string();
                    let target = req.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let route = routes.iter().find(|r| target.contains(r.pattern)).cloned();
                    let (status, body, delay) = match route {
                        Some(r) => {
                            hits.lock().unwrap().push(target.clone());
                            (r.status, r.body, r.delay_ms)
                        }
                        None => (404, "{}".to_string(), 0),
                    };
                    if delay > 0 {
                        sleep(Duration::from_millis(delay)).await;
                    }
                    let rsp = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(rsp.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        Self { base: format!("http://{addr}"), hits }
    }

    pub fn hits(&self) -> usize {
        self.hits.lock().unwrap().len()
    }

    pub fn hits_matching(&self, pattern: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|t| t.contains(pattern)).count()
    }
}

pub fn chart_body(samples: &[(i64, f64)]) -> String {
    let pts: Vec<String> = samples.iter().map(|(t, p)| format!("[{t},{p}]")).collect();
    format!("{{\"prices\":[{}]}}", pts.join(","))
}

pub const SPOT_BODY: &str = r#"{"worldcoin-wld":{"usd":2.0,"usd_24h_change":-1.5,"kes":258.4}}"#;
