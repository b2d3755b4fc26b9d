use crate::{
    dispatcher::{RequestMapper, ResponseMapper},
    error::Error,
    BodyData, RequestData, ResponseData,
};
use serde_json::Value;
use std::collections::HashMap;

/// An inbound HTTP request as the transport read it off the wire: untyped
/// method and uri, headers, and the fully buffered body.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: String,
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// The transport-level response handed back to the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Maps [`WireRequest`]s coming from the bundled hyper transport into the
/// comparison model: splits the uri into path and ordered query pairs and
/// classifies the body by content type.
#[derive(Debug, Default)]
pub struct HyperRequestMapper;

impl HyperRequestMapper {
    pub fn new() -> Self {
        Self
    }

    fn classify_body(headers: &HashMap<String, String>, body: &[u8]) -> Result<Option<BodyData>, Error> {
        if body.is_empty() {
            return Ok(None);
        }

        let content_type = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or("");

        if content_type.contains("application/json") {
            let value: Value = serde_json::from_slice(body).map_err(|_| Error::InvalidBody)?;
            Ok(Some(BodyData::Json(value)))
        } else {
            Ok(Some(BodyData::Raw(body.to_vec())))
        }
    }
}

impl RequestMapper<WireRequest> for HyperRequestMapper {
    fn convert(&self, wire_request: &WireRequest) -> Result<RequestData, Error> {
        let method = wire_request.method.parse()?;

        let (path, query_part) = match wire_request.uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (wire_request.uri.as_str(), ""),
        };

        let query = form_urlencoded::parse(query_part.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let body = Self::classify_body(&wire_request.headers, &wire_request.body)?;

        Ok(RequestData {
            method,
            path: path.into(),
            query,
            headers: wire_request.headers.clone(),
            body,
        })
    }
}

/// Maps the chosen [`ResponseData`] back to the wire. Total: every response
/// the dispatcher can choose has a wire rendition.
#[derive(Debug, Default)]
pub struct HyperResponseMapper;

impl HyperResponseMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseMapper<WireResponse> for HyperResponseMapper {
    fn convert(&self, response: &ResponseData) -> WireResponse {
        let mut headers = response.headers.clone();

        let body = match &response.body {
            None => Vec::new(),
            Some(BodyData::Raw(bytes)) => bytes.clone(),
            Some(BodyData::Json(value)) => {
                let declared = headers
                    .keys()
                    .any(|key| key.eq_ignore_ascii_case("content-type"));
                if !declared {
                    headers.insert("content-type".into(), "application/json".into());
                }
                value.to_string().into_bytes()
            }
        };

        WireResponse {
            status_code: response.status_code,
            headers,
            body,
        }
    }
}
