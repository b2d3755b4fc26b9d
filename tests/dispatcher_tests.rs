use pactsim::{
    CancellationToken, Error, ExpectationStore, HttpMethod, Mismatch, MockProviderConfiguration,
    MockProviderDispatcher, RequestComparer, RequestData, RequestDispatcher, RequestMapper,
    ResponseData, ResponseMapper, TransportContext,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Debug, Clone, PartialEq)]
struct FakeWireRequest;

#[derive(Debug, Clone, PartialEq)]
struct FakeWireResponse {
    status_code: u16,
}

#[derive(Debug)]
struct StubRequestMapper {
    calls: AtomicUsize,
    result: RequestData,
    fail: bool,
}

impl StubRequestMapper {
    fn returning(result: RequestData) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result: RequestData::new(HttpMethod::Get, "/"),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RequestMapper<FakeWireRequest> for StubRequestMapper {
    fn convert(&self, _wire_request: &FakeWireRequest) -> Result<RequestData, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(Error::InvalidBody)
        } else {
            Ok(self.result.clone())
        }
    }
}

#[derive(Debug)]
struct StubResponseMapper {
    calls: AtomicUsize,
    seen: Mutex<Vec<ResponseData>>,
}

impl StubResponseMapper {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<ResponseData> {
        self.seen.lock().unwrap().clone()
    }
}

impl ResponseMapper<FakeWireResponse> for StubResponseMapper {
    fn convert(&self, response: &ResponseData) -> FakeWireResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(response.clone());
        FakeWireResponse {
            status_code: response.status_code,
        }
    }
}

#[derive(Debug)]
struct SpyComparer {
    calls: AtomicUsize,
    seen: Mutex<Vec<(RequestData, RequestData)>>,
    mismatch: Option<Mismatch>,
}

impl SpyComparer {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            mismatch: None,
        })
    }
}

impl RequestComparer for SpyComparer {
    fn compare(&self, expected: &RequestData, actual: &RequestData) -> Result<(), Mismatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((expected.clone(), actual.clone()));
        match &self.mismatch {
            Some(mismatch) => Err(mismatch.clone()),
            None => Ok(()),
        }
    }

    fn compare_full(&self, expected: &RequestData, actual: &RequestData) -> Vec<Mismatch> {
        self.compare(expected, actual).err().into_iter().collect()
    }
}

fn dispatcher(
    store: &Arc<ExpectationStore>,
    request_mapper: &Arc<StubRequestMapper>,
    response_mapper: &Arc<StubResponseMapper>,
    configuration: &MockProviderConfiguration,
) -> MockProviderDispatcher<FakeWireRequest, FakeWireResponse> {
    MockProviderDispatcher::new(
        store.clone(),
        request_mapper.clone(),
        response_mapper.clone(),
        configuration,
    )
}

fn get_test() -> RequestData {
    RequestData::new(HttpMethod::Get, "/Test")
}

#[tokio::test]
async fn no_expectation_returns_500_and_never_maps_the_request() {
    let store = Arc::new(ExpectationStore::new());
    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let mut context = TransportContext::new(FakeWireRequest);
    let result = dispatcher
        .dispatch(&mut context, &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(request_mapper.calls(), 0);
    assert_eq!(response_mapper.calls(), 1);
    assert_eq!(response_mapper.seen(), vec![ResponseData::internal_server_error()]);
}

#[tokio::test]
async fn unset_expected_request_returns_500() {
    let store = Arc::new(ExpectationStore::new());
    store.set(None, Some(ResponseData::new(200)));
    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(request_mapper.calls(), 0);
    assert_eq!(response_mapper.calls(), 1);
}

#[tokio::test]
async fn unset_expected_response_returns_500() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), None);
    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(request_mapper.calls(), 0);
    assert_eq!(response_mapper.calls(), 1);
}

#[tokio::test]
async fn cancelled_token_returns_500_without_mapping_the_request() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));
    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &cancellation)
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(request_mapper.calls(), 0);
    assert_eq!(response_mapper.calls(), 1);
}

#[tokio::test]
async fn request_mapper_runs_exactly_once_per_dispatch() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));
    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(request_mapper.calls(), 1);
}

#[tokio::test]
async fn comparer_receives_the_expected_and_mapped_requests() {
    let expected = get_test().with_header("accept", "application/json");
    let actual = get_test().with_header("accept", "application/json").with_header("host", "x");

    let store = Arc::new(ExpectationStore::new());
    store.set(Some(expected.clone()), Some(ResponseData::new(200)));

    let comparer = SpyComparer::succeeding();
    let mut configuration = MockProviderConfiguration::new();
    configuration.set_comparer(comparer.clone());

    let request_mapper = StubRequestMapper::returning(actual.clone());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(&store, &request_mapper, &response_mapper, &configuration);

    dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(comparer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(comparer.seen.lock().unwrap().clone(), vec![(expected, actual)]);
}

#[tokio::test]
async fn matching_request_returns_the_canned_response_and_fills_the_context_slot() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));
    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let mut context = TransportContext::new(FakeWireRequest);
    let result = dispatcher
        .dispatch(&mut context, &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 200);
    assert_eq!(context.response, Some(result));
    assert_eq!(response_mapper.calls(), 1);
    assert_eq!(response_mapper.seen(), vec![ResponseData::new(200)]);
    assert_eq!(dispatcher.last_mismatch(), None);
}

#[tokio::test]
async fn mismatched_method_returns_500_and_records_a_method_mismatch() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));
    let request_mapper = StubRequestMapper::returning(RequestData::new(HttpMethod::Put, "/Test"));
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(response_mapper.calls(), 1);
    assert_eq!(
        dispatcher.last_mismatch(),
        Some(Mismatch::Method {
            expected: HttpMethod::Get,
            actual: HttpMethod::Put,
        })
    );
}

#[tokio::test]
async fn a_matching_dispatch_clears_the_previous_mismatch() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));

    let request_mapper = StubRequestMapper::returning(RequestData::new(HttpMethod::Put, "/Test"));
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;
    assert!(dispatcher.last_mismatch().is_some());

    // Re-arm with the request the mapper actually produces.
    store.set(
        Some(RequestData::new(HttpMethod::Put, "/Test")),
        Some(ResponseData::new(200)),
    );
    dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;
    assert_eq!(dispatcher.last_mismatch(), None);
}

#[tokio::test]
async fn reset_behaves_like_never_configured() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));
    store.reset();

    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(request_mapper.calls(), 0);
    assert_eq!(response_mapper.calls(), 1);
}

#[tokio::test]
async fn setting_the_same_expectation_twice_is_idempotent() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));
    store.set(Some(get_test()), Some(ResponseData::new(200)));

    let request_mapper = StubRequestMapper::returning(get_test());
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 200);
}

#[tokio::test]
async fn request_mapper_failure_resolves_to_500() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));

    let request_mapper = StubRequestMapper::failing();
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(
        &store,
        &request_mapper,
        &response_mapper,
        &MockProviderConfiguration::new(),
    );

    let result = dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    assert_eq!(result.status_code, 500);
    assert_eq!(request_mapper.calls(), 1);
    assert_eq!(response_mapper.calls(), 1);
}

#[tokio::test]
async fn mismatch_body_is_exposed_only_when_configured() {
    let store = Arc::new(ExpectationStore::new());
    store.set(Some(get_test()), Some(ResponseData::new(200)));

    let mut configuration = MockProviderConfiguration::new();
    configuration.set_expose_mismatch_body(true);

    let request_mapper = StubRequestMapper::returning(RequestData::new(HttpMethod::Put, "/Test"));
    let response_mapper = StubResponseMapper::new();
    let dispatcher = dispatcher(&store, &request_mapper, &response_mapper, &configuration);

    dispatcher
        .dispatch(&mut TransportContext::new(FakeWireRequest), &CancellationToken::new())
        .await;

    let seen = response_mapper.seen();
    assert_eq!(seen.len(), 1);
    match &seen[0].body {
        Some(pactsim::BodyData::Raw(bytes)) => {
            let rendered = String::from_utf8(bytes.clone()).unwrap();
            assert!(rendered.contains("Expected method GET, got PUT"));
        }
        other => panic!("expected a raw diagnostic body, got {:?}", other),
    }
}
