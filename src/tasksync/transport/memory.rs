use super::{Request, Response, Transport};
use crate::config::ClientConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use url::Url;

#[derive(Debug, Clone)]
enum Reply {
    Respond(Response),
    Fail(String),
    Hang,
}

/// In-memory [`Transport`] for tests.
///
/// Replies are queued per endpoint (matched against the end of the request
/// path) and handed out in order. Every executed request is logged.
#[derive(Debug)]
pub struct InMemoryTransport {
    base_url: Url,
    user_agent: Option<String>,
    replies: Mutex<Vec<(String, VecDeque<Reply>)>>,
    requests: Mutex<Vec<Request>>,
}

impl InMemoryTransport {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            user_agent: None,
            replies: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            user_agent: Some(config.user_agent.clone()),
            ..Self::new(config.base_url()?)
        })
    }

    /// Queue `response` for the next request to `endpoint`.
    pub fn respond(&self, endpoint: &str, response: Response) -> &Self {
        self.push(endpoint, Reply::Respond(response))
    }

    /// Fail the next request to `endpoint` with a transport error.
    pub fn fail(&self, endpoint: &str, message: &str) -> &Self {
        self.push(endpoint, Reply::Fail(message.to_string()))
    }

    /// Never answer the next request to `endpoint`.
    pub fn hang(&self, endpoint: &str) -> &Self {
        self.push(endpoint, Reply::Hang)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    fn push(&self, endpoint: &str, reply: Reply) -> &Self {
        let mut replies = self.replies.lock();
        match replies.iter_mut().find(|(e, _)| e.as_str() == endpoint) {
            Some((_, queue)) => queue.push_back(reply),
            None => replies.push((endpoint.to_string(), VecDeque::from([reply]))),
        }
        self
    }

    fn next_reply(&self, request: &Request) -> Option<Reply> {
        let path = request.url.path();
        self.replies
            .lock()
            .iter_mut()
            .find(|(endpoint, _)| path.ends_with(endpoint.as_str()))
            .and_then(|(_, queue)| queue.pop_front())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        self.requests.lock().push(request.clone());
        match self.next_reply(&request) {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(SyncError::Transport(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(SyncError::Transport(format!(
                "no response queued for {} {}",
                request.method,
                request.url.path()
            ))),
        }
    }
}
