//! Request construction, dispatch and response translation.
//!
//! Every resource operation funnels through [`Operator`]: it resolves the
//! target service root, attaches a bearer token, assembles the final URI,
//! dispatches the request and translates the response into the caller's
//! shape or a typed error. A 401 invalidates the token provider and replays
//! the request exactly once with a fresh token.

mod multipart;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::Stream;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::context::{ConnectionContext, ServiceKind};
use crate::errors::{ApiError, ClientError, Result};
use crate::jobs::JobHandle;
use crate::token::TokenProvider;

/// One named part of a multipart request body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// Part name.
    pub name: String,
    /// Optional file name for the content disposition.
    pub filename: Option<String>,
    /// Content type of this part.
    pub content_type: String,
    /// Part content.
    pub bytes: Bytes,
}

impl MultipartPart {
    /// Creates a part with the given name, content type and content.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Sets the file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Body of a request, by shape.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    None,
    /// A JSON document.
    Json(serde_json::Value),
    /// Raw bytes with an explicit content type.
    Raw {
        /// Content type of the payload.
        content_type: String,
        /// The payload.
        bytes: Bytes,
    },
    /// A multipart form with named parts.
    Multipart(Vec<MultipartPart>),
}

/// A logical request against one of the platform's services.
///
/// Immutable once built; consumed exactly once by the operator. Query
/// parameters keep their insertion order and may repeat a key — some
/// endpoints are order-sensitive for filter semantics.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: Vec<String>,
    query: Vec<(String, String)>,
    body: RequestBody,
}

impl RequestSpec {
    /// Creates a spec for the given method and path segments.
    pub fn new(
        method: Method,
        path: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            method,
            path: path.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: RequestBody::None,
        }
    }

    /// A GET spec.
    pub fn get(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST spec.
    pub fn post(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A PUT spec.
    pub fn put(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A DELETE spec.
    pub fn delete(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter. Repeated keys are kept, in order.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Appends a collection-valued query parameter as one comma-joined value,
    /// the convention for the controller's list filters.
    pub fn query_list(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        let joined = values
            .into_iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.query.push((key.into(), joined));
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a raw body with an explicit content type.
    pub fn raw(mut self, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Raw {
            content_type: content_type.into(),
            bytes: bytes.into(),
        };
        self
    }

    /// Appends a multipart part, switching the body to multipart.
    pub fn part(mut self, part: MultipartPart) -> Self {
        match &mut self.body {
            RequestBody::Multipart(parts) => parts.push(part),
            _ => self.body = RequestBody::Multipart(vec![part]),
        }
        self
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path segments.
    pub fn path_segments(&self) -> &[String] {
        &self.path
    }

    /// The query parameters, in insertion order.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }
}

/// Dispatches request specs against the platform and translates responses.
pub struct Operator {
    context: Arc<ConnectionContext>,
    token_provider: Arc<TokenProvider>,
}

impl Operator {
    /// Creates an operator over a context and token provider.
    pub fn new(context: Arc<ConnectionContext>, token_provider: Arc<TokenProvider>) -> Self {
        Self {
            context,
            token_provider,
        }
    }

    /// Executes a spec and deserializes the 2xx response body into `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        service: ServiceKind,
        spec: RequestSpec,
    ) -> Result<T> {
        let response = self.dispatch(service, &spec).await?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(&e))?;

        if !status.is_success() {
            return Err(ClientError::Api(ApiError::from_response_body(
                status.as_u16(),
                &bytes,
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::protocol(format!("undeserializable response body: {}", e)))
    }

    /// Executes a spec whose success carries no body (e.g. 204).
    pub async fn execute_unit(&self, service: ServiceKind, spec: RequestSpec) -> Result<()> {
        let response = self.dispatch(service, &spec).await?;
        let status = response.status();

        if !status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ClientError::transport(&e))?;
            return Err(ClientError::Api(ApiError::from_response_body(
                status.as_u16(),
                &bytes,
            )));
        }

        Ok(())
    }

    /// Executes a spec whose acceptance is signalled by a `Location` header
    /// naming the created job or resource.
    pub async fn execute_accepted(
        &self,
        service: ServiceKind,
        spec: RequestSpec,
    ) -> Result<JobHandle> {
        let response = self.dispatch(service, &spec).await?;
        let status = response.status();

        if !status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ClientError::transport(&e))?;
            return Err(ClientError::Api(ApiError::from_response_body(
                status.as_u16(),
                &bytes,
            )));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ClientError::protocol("accepted response carries no Location header"))?;

        JobHandle::from_location(location)
    }

    /// Executes a spec against a bulk endpoint, decoding the multipart-framed
    /// response into one item per part.
    ///
    /// The boundary token comes from the response's `Content-Type` header; a
    /// missing or malformed boundary fails the whole stream rather than
    /// yielding zero parts.
    pub async fn execute_stream(
        &self,
        service: ServiceKind,
        spec: RequestSpec,
    ) -> Result<impl Stream<Item = Result<Bytes>>> {
        let response = self.dispatch(service, &spec).await?;
        let status = response.status();

        if !status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ClientError::transport(&e))?;
            return Err(ClientError::Api(ApiError::from_response_body(
                status.as_u16(),
                &bytes,
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let boundary = multipart::boundary_from_content_type(content_type).ok_or_else(|| {
            ClientError::protocol(format!(
                "Content-Type {} does not carry a multipart boundary",
                content_type
            ))
        })?;

        Ok(multipart::part_stream(&boundary, response.bytes_stream()))
    }

    /// Resolves the final URI for a spec against a service root.
    pub async fn url_for(&self, service: ServiceKind, spec: &RequestSpec) -> Result<Url> {
        let mut url = self.context.root(service).await?;

        url.path_segments_mut()
            .map_err(|_| ClientError::protocol("service root cannot carry a path"))?
            .pop_if_empty()
            .extend(spec.path_segments().iter().map(String::as_str));

        if !spec.query_params().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in spec.query_params() {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn dispatch(&self, service: ServiceKind, spec: &RequestSpec) -> Result<reqwest::Response> {
        let url = self.url_for(service, spec).await?;
        let mut reauthenticated = false;

        loop {
            let token = self.token_provider.token(&self.context).await?;
            let request = self.build_request(&url, spec, &token.authorization_header())?;

            let started = Instant::now();
            let response = request.send().await.map_err(|e| ClientError::transport(&e))?;
            let status = response.status();

            tracing::debug!(
                method = %spec.method(),
                url = %url,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );

            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                // The token was rejected mid-lifetime; force a fresh grant
                // and replay once before surfacing the 401.
                self.token_provider.invalidate();
                reauthenticated = true;
                continue;
            }

            return Ok(response);
        }
    }

    fn build_request(
        &self,
        url: &Url,
        spec: &RequestSpec,
        authorization: &str,
    ) -> Result<RequestBuilder> {
        let mut request = self
            .context
            .http()
            .request(spec.method().clone(), url.clone())
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json");

        request = match &spec.body {
            RequestBody::None => request,
            RequestBody::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| {
                    ClientError::configuration(format!("unserializable request body: {}", e))
                })?;
                request
                    .header(CONTENT_TYPE, "application/json")
                    .body(bytes)
            }
            RequestBody::Raw {
                content_type,
                bytes,
            } => request
                .header(CONTENT_TYPE, content_type.clone())
                .body(bytes.clone()),
            RequestBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let mut piece = reqwest::multipart::Part::bytes(part.bytes.to_vec())
                        .mime_str(&part.content_type)
                        .map_err(|e| {
                            ClientError::configuration(format!(
                                "invalid part content type {}: {}",
                                part.content_type, e
                            ))
                        })?;
                    if let Some(filename) = &part.filename {
                        piece = piece.file_name(filename.clone());
                    }
                    form = form.part(part.name.clone(), piece);
                }
                request.multipart(form)
            }
        };

        Ok(request)
    }
}
