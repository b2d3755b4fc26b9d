use crate::{
    cancellation::CancellationToken,
    comparer::{Mismatch, RequestComparer},
    configuration::MockProviderConfiguration,
    error::Error,
    expectation::ExpectationStore,
    BodyData, RequestData, ResponseData,
};
use async_trait::async_trait;
use log::{debug, warn};
use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

/// Converts a transport's wire request into the comparison model. A mapper
/// failure is handled like a mismatch: the dispatcher still answers, with a
/// synthetic 500.
pub trait RequestMapper<W>: Debug {
    fn convert(&self, wire_request: &W) -> Result<RequestData, Error>;
}

/// Converts the chosen [`ResponseData`] back into the transport's wire
/// format. Must be total: it runs on every dispatch, including the synthetic
/// 500 paths.
pub trait ResponseMapper<W>: Debug {
    fn convert(&self, response: &ResponseData) -> W;
}

/// What a transport hands to [`RequestDispatcher::dispatch`]: the wire
/// request plus an out-of-band response slot. The dispatcher fills the slot
/// with the same response it returns, for transports that read it from the
/// context instead of the return value.
#[derive(Debug)]
pub struct TransportContext<Req, Resp> {
    pub request: Req,
    pub response: Option<Resp>,
}

impl<Req, Resp> TransportContext<Req, Resp> {
    pub fn new(request: Req) -> Self {
        Self {
            request,
            response: None,
        }
    }
}

#[async_trait]
pub trait RequestDispatcher<Req, Resp>
where
    Req: Send + Sync,
    Resp: Send + Sync,
{
    async fn dispatch(
        &self,
        context: &mut TransportContext<Req, Resp>,
        cancellation: &CancellationToken,
    ) -> Resp;
}

/// Answers each incoming request from the current expectation: the canned
/// response when the request matches the expected one, a synthetic 500
/// otherwise. Every path produces a well-formed response; a mismatch is an
/// expected outcome of contract verification, not a fault.
#[derive(Debug)]
pub struct MockProviderDispatcher<Req, Resp> {
    store: Arc<ExpectationStore>,
    request_mapper: Arc<dyn RequestMapper<Req> + Send + Sync>,
    response_mapper: Arc<dyn ResponseMapper<Resp> + Send + Sync>,
    comparer: Arc<dyn RequestComparer + Send + Sync>,
    expose_mismatch_body: bool,
    last_mismatch: Mutex<Option<Mismatch>>,
}

impl<Req, Resp> MockProviderDispatcher<Req, Resp> {
    pub fn new(
        store: Arc<ExpectationStore>,
        request_mapper: Arc<dyn RequestMapper<Req> + Send + Sync>,
        response_mapper: Arc<dyn ResponseMapper<Resp> + Send + Sync>,
        configuration: &MockProviderConfiguration,
    ) -> Self {
        Self {
            store,
            request_mapper,
            response_mapper,
            comparer: configuration.comparer(),
            expose_mismatch_body: configuration.expose_mismatch_body(),
            last_mismatch: Mutex::new(None),
        }
    }

    /// The mismatch recorded by the most recent dispatch, if it failed to
    /// match. Cleared at the start of every dispatch.
    pub fn last_mismatch(&self) -> Option<Mismatch> {
        self.last_mismatch.lock().unwrap().clone()
    }

    fn resolve(&self, wire_request: &Req, cancellation: &CancellationToken) -> ResponseData {
        let expectation = self.store.get();
        let (expected_request, expected_response) = match (expectation.request, expectation.response)
        {
            (Some(request), Some(response)) => (request, response),
            _ => {
                debug!("no expectation configured, answering 500");
                return ResponseData::internal_server_error();
            }
        };

        if cancellation.is_cancelled() {
            debug!("dispatch cancelled before matching, answering 500");
            return ResponseData::internal_server_error();
        }

        let actual_request = match self.request_mapper.convert(wire_request) {
            Ok(request) => request,
            Err(error) => {
                warn!("request mapping failed: {}", error);
                return ResponseData::internal_server_error();
            }
        };

        match self.comparer.compare(&expected_request, &actual_request) {
            Ok(()) => expected_response,
            Err(mismatch) => {
                warn!("request mismatch: {}", mismatch);
                let mut response = ResponseData::internal_server_error();
                if self.expose_mismatch_body {
                    response.body = Some(BodyData::Raw(mismatch.to_string().into_bytes()));
                }
                *self.last_mismatch.lock().unwrap() = Some(mismatch);
                response
            }
        }
    }
}

#[async_trait]
impl<Req, Resp> RequestDispatcher<Req, Resp> for MockProviderDispatcher<Req, Resp>
where
    Req: Send + Sync,
    Resp: Clone + Send + Sync,
{
    async fn dispatch(
        &self,
        context: &mut TransportContext<Req, Resp>,
        cancellation: &CancellationToken,
    ) -> Resp {
        *self.last_mismatch.lock().unwrap() = None;

        let chosen = self.resolve(&context.request, cancellation);

        // The response mapper runs exactly once per dispatch, on whichever
        // response the resolution chose.
        let wire_response = self.response_mapper.convert(&chosen);
        context.response = Some(wire_response.clone());
        wire_response
    }
}
