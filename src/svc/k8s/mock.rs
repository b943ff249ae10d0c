//! # Mock module
//!
//! This module provide a scripted kubernetes api server, it answers the
//! requests issued through a [`kube::Client`] in the order they are expected
//! and keeps every request it received.

use std::{
    collections::VecDeque,
    error::Error,
    sync::{Arc, Mutex},
};

use hyper::{
    header::{self, HeaderValue},
    service::service_fn,
    Body, Method, Response, StatusCode,
};
use serde_json::{json, Value};

// -----------------------------------------------------------------------------
// Reply enumeration

#[derive(Clone, Debug)]
pub enum Reply {
    /// answer with the given document
    Json(Value),
    /// answer with the body of the request
    Echo,
}

// -----------------------------------------------------------------------------
// Request structure

#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Value,
}

#[derive(Clone, Debug)]
struct Exchange {
    method: Method,
    path: String,
    status: StatusCode,
    reply: Reply,
}

// -----------------------------------------------------------------------------
// ApiServer structure

#[derive(Clone, Default, Debug)]
pub struct ApiServer {
    script: Arc<Mutex<VecDeque<Exchange>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl ApiServer {
    /// expect a request and answer it with the given status and reply
    pub fn expect(self, method: Method, path: &str, status: StatusCode, reply: Reply) -> Self {
        self.script
            .lock()
            .expect("lock not to be poisoned")
            .push_back(Exchange {
                method,
                path: path.to_string(),
                status,
                reply,
            });

        self
    }

    /// returns the requests received so far
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .expect("lock not to be poisoned")
            .to_owned()
    }

    /// returns the number of expected requests not received yet
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("lock not to be poisoned").len()
    }

    /// returns a kubernetes client sending its requests to this server
    pub fn client(&self) -> kube::Client {
        let server = self.to_owned();
        let service = service_fn(move |req: hyper::Request<Body>| {
            let server = server.to_owned();

            async move {
                let method = req.method().to_owned();
                let path = req.uri().path().to_string();
                let bytes = hyper::body::to_bytes(req.into_body()).await?;
                let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

                server
                    .requests
                    .lock()
                    .expect("lock not to be poisoned")
                    .push(Request {
                        method: method.to_owned(),
                        path: path.to_owned(),
                        body: body.to_owned(),
                    });

                let next = server
                    .script
                    .lock()
                    .expect("lock not to be poisoned")
                    .pop_front();

                let (status, payload) = match next {
                    Some(exchange) if exchange.method == method && exchange.path == path => {
                        let payload = match exchange.reply {
                            Reply::Json(value) => value,
                            Reply::Echo => body,
                        };

                        (exchange.status, payload)
                    }
                    other => {
                        let message = format!(
                            "unexpected request '{method} {path}', expected {:?}",
                            other.map(|exchange| format!("{} {}", exchange.method, exchange.path))
                        );

                        (
                            StatusCode::NOT_IMPLEMENTED,
                            failure(StatusCode::NOT_IMPLEMENTED, &message),
                        )
                    }
                };

                let mut res = Response::new(Body::from(payload.to_string()));
                *res.status_mut() = status;
                res.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );

                Ok::<_, Box<dyn Error + Send + Sync>>(res)
            }
        });

        kube::Client::new(service, "default")
    }
}

/// returns the status document sent by the api server on failures
pub fn failure(code: StatusCode, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": code.canonical_reason().unwrap_or_default(),
        "code": code.as_u16(),
    })
}
