//! Pass-through to the storefront origin.
//! Requests that clear the edge filter and match no local route go here.

use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::{
        header,
        uri::{Authority, InvalidUri, Scheme},
        HeaderName, Uri,
    },
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::response::ApiError;

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    connect_timeout: Duration,
}

impl Upstream {
    pub fn new(address: &str, connect_timeout: Duration) -> Result<Self, InvalidUri> {
        let authority = address.parse::<Authority>()?;
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self {
            client,
            authority,
            connect_timeout,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub async fn forward(&self, request: Request) -> Result<Response, ApiError> {
        let (mut parts, body) = request.into_parts();

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(self.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some("/".parse().map_err(|_| ApiError::Internal)?);
        }
        parts.uri = Uri::from_parts(uri_parts).map_err(|e| {
            tracing::error!(error = %e, "Failed to build upstream URI");
            ApiError::Internal
        })?;

        for name in HOP_BY_HOP {
            parts.headers.remove(HeaderName::from_static(name));
        }
        parts.headers.remove(header::HOST);

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Err(e) => {
                tracing::error!(method = %method, path = %path, upstream = %self.authority, error = %e, "Upstream error");
                Err(ApiError::BadGateway)
            }
        }
    }
}
