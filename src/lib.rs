//! A mock provider for consumer-driven contract testing: register one
//! (expected request, canned response) expectation, point an HTTP client at
//! the mock, and every dispatch answers the canned response on a match or a
//! synthetic 500 otherwise. It never leaves the caller without a response.

mod cancellation;
mod comparer;
mod configuration;
mod data;
mod dispatcher;
mod error;
mod expectation;
mod mappers;
mod mock_server;

pub use cancellation::CancellationToken;
pub use comparer::{Mismatch, ProviderRequestComparer, RequestComparer};
pub use configuration::MockProviderConfiguration;
pub use data::{BodyData, HttpMethod, RequestData, ResponseData};
pub use dispatcher::{
    MockProviderDispatcher, RequestDispatcher, RequestMapper, ResponseMapper, TransportContext,
};
pub use error::Error;
pub use expectation::{Expectation, ExpectationStore};
pub use mappers::{HyperRequestMapper, HyperResponseMapper, WireRequest, WireResponse};
pub use mock_server::MockProviderServer;
