use crate::{
    cancellation::CancellationToken,
    comparer::Mismatch,
    configuration::MockProviderConfiguration,
    dispatcher::{MockProviderDispatcher, RequestDispatcher, TransportContext},
    error::Error,
    expectation::ExpectationStore,
    mappers::{HyperRequestMapper, HyperResponseMapper, WireRequest, WireResponse},
    RequestData, ResponseData,
};
use hyper::{
    body,
    header::{HeaderName, HeaderValue},
    service::{make_service_fn, service_fn},
    Body, HeaderMap, Request, Response, Server,
};
use std::{
    collections::HashMap,
    convert::Infallible,
    net::{SocketAddr, TcpListener},
    sync::Arc,
    thread::{self, JoinHandle},
};
use tokio::{runtime::Runtime, sync::oneshot};

/// A mock provider listening on a local port. Each instance owns its
/// expectation store and dispatcher, so parallel test runs can stand up
/// independent servers without sharing state.
#[derive(Debug)]
pub struct MockProviderServer {
    store: Arc<ExpectationStore>,
    dispatcher: Arc<MockProviderDispatcher<WireRequest, WireResponse>>,
    address: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl MockProviderServer {
    /// Binds the configured address (an ephemeral port by default) and
    /// starts serving on a dedicated thread.
    pub fn start(configuration: MockProviderConfiguration) -> Result<Self, Error> {
        let store = Arc::new(ExpectationStore::new());
        let dispatcher = Arc::new(MockProviderDispatcher::new(
            store.clone(),
            Arc::new(HyperRequestMapper::new()),
            Arc::new(HyperResponseMapper::new()),
            &configuration,
        ));

        // Bind synchronously so the caller sees bind errors and the port is
        // accepting connections before `start` returns.
        let listener = TcpListener::bind(configuration.listen_address())?;
        listener.set_nonblocking(true)?;
        let address = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_dispatcher = dispatcher.clone();

        let join_handle = thread::spawn(move || {
            Runtime::new().unwrap().block_on(async move {
                let builder = match Server::from_tcp(listener) {
                    Ok(builder) => builder,
                    Err(e) => {
                        log::error!("mock provider failed to take over listener: {}", e);
                        return;
                    }
                };

                let server = builder
                    .serve(make_service_fn(move |_| {
                        let dispatcher = server_dispatcher.clone();
                        async move {
                            Ok::<_, Infallible>(service_fn(move |request| {
                                let dispatcher = dispatcher.clone();
                                async move {
                                    match handle_request(dispatcher, request).await {
                                        Ok(response) => Ok::<_, Infallible>(response),
                                        Err(error) => {
                                            log::error!("transport failure: {}", error);
                                            Ok(Response::builder()
                                                .status(500)
                                                .body(Body::empty())
                                                .unwrap())
                                        }
                                    }
                                }
                            }))
                        }
                    }))
                    .with_graceful_shutdown(async {
                        shutdown_rx.await.ok();
                    });

                if let Err(e) = server.await {
                    log::error!("mock provider server error: {}", e);
                }
            });
        });

        Ok(Self {
            store,
            dispatcher,
            address,
            shutdown: Some(shutdown_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn set_expectation(
        &self,
        request: Option<RequestData>,
        response: Option<ResponseData>,
    ) {
        self.store.set(request, response);
    }

    pub fn reset(&self) {
        self.store.reset();
    }

    pub fn store(&self) -> Arc<ExpectationStore> {
        self.store.clone()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    /// Mismatch recorded by the most recent dispatch, for the verification
    /// layer to report alongside the 500.
    pub fn last_mismatch(&self) -> Option<Mismatch> {
        self.dispatcher.last_mismatch()
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .join()
                .expect("Couldn't gracefully shutdown the mock provider server thread");
        }
    }
}

async fn handle_request(
    dispatcher: Arc<MockProviderDispatcher<WireRequest, WireResponse>>,
    request: Request<Body>,
) -> Result<Response<Body>, Error> {
    let wire_request = read_wire_request(request).await?;
    let mut context = TransportContext::new(wire_request);

    let wire_response = dispatcher
        .dispatch(&mut context, &CancellationToken::new())
        .await;

    build_response(wire_response)
}

async fn read_wire_request(mut request: Request<Body>) -> Result<WireRequest, Error> {
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let headers = extract_headers(request.headers());

    let body = body::to_bytes(request.body_mut())
        .await
        .map_err(|_| Error::InvalidBody)?;

    Ok(WireRequest {
        method,
        uri,
        headers,
        body: body.to_vec(),
    })
}

fn build_response(wire_response: WireResponse) -> Result<Response<Body>, Error> {
    let mut builder = Response::builder().status(wire_response.status_code);

    if let Some(header_map) = builder.headers_mut() {
        put_headers(header_map, &wire_response.headers)?;
    }

    Ok(builder.body(wire_response.body.into())?)
}

fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    // header values with opaque characters are skipped
    header_map
        .iter()
        .map(|(k, v)| (String::from(k.as_str()), v.to_str()))
        .filter_map(|(key, value)| value.ok().map(|v| (key, String::from(v))))
        .collect()
}

fn put_headers(
    header_map: &mut HeaderMap<HeaderValue>,
    headers: &HashMap<String, String>,
) -> Result<(), Error> {
    for (key, value) in headers {
        let header_name = HeaderName::from_lowercase(key.to_lowercase().as_bytes())?;
        let header_value = HeaderValue::from_str(value)?;
        header_map.append(header_name, header_value);
    }

    Ok(())
}
