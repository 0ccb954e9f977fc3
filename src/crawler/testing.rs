//! Deterministic [`Fetcher`] for unit tests

use crate::crawler::fetcher::{FetchError, FetchMethod, FetchRequest, FetchResponse, Fetcher};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Route {
    /// HTML page; HEAD answers with the same status and no body
    Page {
        status: u16,
        content_type: Option<&'static str>,
        chunks: Vec<Bytes>,
    },
    /// Bare statuses for HEAD and GET
    Status { head: u16, get: u16 },
    Error(FetchError),
    /// Response head arrives, then the body fails
    BrokenBody,
    Delay(Duration, Box<Route>),
    /// Never answers
    Hang,
}

#[derive(Debug, Default)]
pub(crate) struct StubFetcher {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<(FetchMethod, String)>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub(crate) fn page(self, url: &str, html: &str) -> Self {
        self.route(
            url,
            Route::Page {
                status: 200,
                content_type: Some("text/html; charset=utf-8"),
                chunks: vec![Bytes::from(html.to_string())],
            },
        )
    }

    pub(crate) fn status(self, url: &str, status: u16) -> Self {
        self.route(
            url,
            Route::Status {
                head: status,
                get: status,
            },
        )
    }

    pub(crate) fn requests(&self) -> Vec<(FetchMethod, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(route: Route, method: FetchMethod) -> futures::future::BoxFuture<'static, Result<FetchResponse, FetchError>> {
        Box::pin(async move {
            match route {
                Route::Page {
                    status,
                    content_type,
                    chunks,
                } => match method {
                    FetchMethod::Get => Ok(FetchResponse::from_chunks(status, content_type, chunks)),
                    FetchMethod::Head => Ok(FetchResponse::from_chunks(status, content_type, Vec::new())),
                },
                Route::Status { head, get } => {
                    let status = match method {
                        FetchMethod::Head => head,
                        FetchMethod::Get => get,
                    };
                    Ok(FetchResponse::from_bytes(status, None, Bytes::new()))
                }
                Route::Error(err) => Err(err),
                Route::BrokenBody => Ok(FetchResponse {
                    status: 200,
                    content_type: Some("text/html".to_string()),
                    body: Box::pin(futures::stream::iter(vec![
                        Ok(Bytes::from_static(b"<title>Half")),
                        Err(FetchError::Other("connection reset".to_string())),
                    ])),
                }),
                Route::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    Self::respond(*inner, method).await
                }
                Route::Hang => std::future::pending().await,
            }
        })
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((request.method, request.url.to_string()));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(Arc::clone(&self.in_flight));

        let route = self
            .routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or(Route::Status { head: 404, get: 404 });

        Self::respond(route, request.method).await
    }
}
