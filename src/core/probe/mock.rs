// src/core/probe/mock.rs

//! In-memory transport for offline runs and tests.

use super::{HttpResponse, HttpTransport, ProbeContext, ProbeRequest};
use crate::core::error::ProbeError;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum MockReply {
    Respond { status: u16, body: String },
    Fail(String),
    /// Never resolves; only cancellation ends the request.
    Hang,
}

#[derive(Debug)]
struct Route {
    fragment: String,
    replies: Vec<MockReply>,
    served: usize,
}

/// Routes each request to the first registered route whose fragment appears
/// in the URL. A route with several replies serves them in order and then
/// keeps repeating the last one. Unrouted URLs get a 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, fragment: &str, replies: Vec<MockReply>) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(Route { fragment: fragment.to_string(), replies, served: 0 });
        }
        self
    }

    pub fn json(self, fragment: &str, body: impl Into<String>) -> Self {
        self.route(fragment, vec![MockReply::Respond { status: 200, body: body.into() }])
    }

    pub fn status(self, fragment: &str, status: u16) -> Self {
        self.route(fragment, vec![MockReply::Respond { status, body: String::new() }])
    }

    pub fn fail(self, fragment: &str, message: &str) -> Self {
        self.route(fragment, vec![MockReply::Fail(message.to_string())])
    }

    pub fn hang(self, fragment: &str) -> Self {
        self.route(fragment, vec![MockReply::Hang])
    }

    /// URLs requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self, fragment: &str) -> usize {
        self.requests().iter().filter(|u| u.contains(fragment)).count()
    }

    fn next_reply(&self, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().ok()?;
        let route = routes.iter_mut().find(|r| url.contains(&r.fragment))?;
        let index = route.served.min(route.replies.len().saturating_sub(1));
        route.served += 1;
        route.replies.get(index).cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, request: ProbeRequest, ctx: &ProbeContext) -> Result<HttpResponse, ProbeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.url.clone());
        }
        match self.next_reply(&request.url) {
            Some(MockReply::Respond { status, body }) => Ok(HttpResponse { url: request.url, status, body }),
            Some(MockReply::Fail(message)) => Err(ProbeError::Transport { url: request.url, message }),
            Some(MockReply::Hang) => {
                ctx.token().cancelled().await;
                Err(ProbeError::Cancelled)
            }
            None => Ok(HttpResponse { url: request.url, status: 404, body: String::new() }),
        }
    }
}
