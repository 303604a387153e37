//! Local callback listener for the OAuth redirect
//!
//! A single-use loopback HTTP endpoint. The first request on the callback
//! route is answered with a static page and its result is handed to the
//! waiting login flow. Later requests get a 409 page until the waiter shuts
//! the listener down. Timeouts and cancellation tear it down the same way,
//! and the port is checked to be free again before control returns to the
//! caller.
//!
//! Lifecycle: an unbound [`ListenerConfig`] is the idle state,
//! [`CallbackListener::bind`] moves to `Listening`, and the serving loop ends
//! in either `Completed` or `Cancelled`. A listener never restarts.

use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::error::FlowError;

/// How often the serving loop checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the OS to release the port after shutdown
const PORT_RELEASE_GRACE: Duration = Duration::from_secs(1);

const PORT_PROBE_INTERVAL: Duration = Duration::from_millis(5);

pub const DEFAULT_CALLBACK_PORT: u16 = 8080;
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// Where the listener binds and which route it serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub host: IpAddr,
    /// `0` picks an ephemeral port (tests)
    pub port: u16,
    pub path: String,
}

impl Default for ListenerConfig {
    /// IPv4 loopback only. The registered redirect URI names `localhost`,
    /// which browsers resolve to `127.0.0.1` after `::1` is refused, and
    /// nothing off the machine can reach the listener.
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_CALLBACK_PORT,
            path: DEFAULT_CALLBACK_PATH.to_string(),
        }
    }
}

impl ListenerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Loopback listener on an OS-assigned port
    pub fn ephemeral() -> Self {
        Self::with_port(0)
    }

    /// Redirect URI registered with the provider for this config
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.port, &self.path)
    }
}

fn redirect_uri_for(port: u16, path: &str) -> String {
    format!("http://localhost:{port}{path}")
}

/// Authorization code delivered by the provider redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// What the single qualifying callback request carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// `code` parameter present
    Authorized(AuthorizationCode),
    /// `error` parameter present (takes precedence over `code`)
    Denied(String),
    /// Neither parameter present; a protocol violation
    Empty,
}

impl CallbackResult {
    /// Classify a callback URL by its query parameters
    pub fn from_url(url: &Url) -> Self {
        let mut code = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "code" if code.is_none() => code = Some(value.into_owned()),
                "error" if error.is_none() => error = Some(value.into_owned()),
                "error_description" if description.is_none() => {
                    description = Some(value.into_owned())
                }
                _ => {}
            }
        }

        match (error, code) {
            (Some(error), _) => match description {
                Some(description) => CallbackResult::Denied(format!("{error}: {description}")),
                None => CallbackResult::Denied(error),
            },
            (None, Some(code)) => CallbackResult::Authorized(AuthorizationCode(code)),
            (None, None) => CallbackResult::Empty,
        }
    }

    pub fn into_code(self) -> Result<AuthorizationCode, FlowError> {
        match self {
            CallbackResult::Authorized(code) => Ok(code),
            CallbackResult::Denied(reason) => Err(FlowError::ProviderError(reason)),
            CallbackResult::Empty => Err(FlowError::MissingCode),
        }
    }
}

/// Observable listener state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    /// A callback was received; `authorized` is false for error/empty callbacks
    Completed { authorized: bool },
    /// Stopped by deadline, cancellation or a server error, without a result
    Cancelled,
}

impl ListenerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ListenerState::Listening)
    }
}

/// A bound callback endpoint that has not started serving yet
pub struct CallbackListener {
    server: Server,
    addr: SocketAddr,
    path: String,
    state: Arc<Mutex<ListenerState>>,
}

impl CallbackListener {
    /// Bind the configured address and register the callback route
    pub fn bind(config: &ListenerConfig) -> Result<Self, FlowError> {
        let requested = SocketAddr::new(config.host, config.port);
        let server = Server::http(requested).map_err(|source| FlowError::Bind {
            addr: requested,
            source,
        })?;

        let addr = server.server_addr().to_ip().ok_or_else(|| {
            FlowError::ListenerFailed(format!("listener on {requested} has no IP address"))
        })?;

        info!("Callback listener bound on {}", addr);

        Ok(Self {
            server,
            addr,
            path: config.path.clone(),
            state: Arc::new(Mutex::new(ListenerState::Listening)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Redirect URI pointing at the port actually bound
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.addr.port(), &self.path)
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Start serving in the background.
    ///
    /// The listener stops when `cancel` (or the returned handle) is cancelled.
    pub fn spawn(self, cancel: &CancellationToken) -> ListenerHandle {
        let (result_tx, result_rx) = oneshot::channel();
        let cancel = cancel.child_token();
        let redirect_uri = self.redirect_uri();

        let CallbackListener {
            server,
            addr,
            path,
            state,
        } = self;

        let task = {
            let cancel = cancel.clone();
            let state = state.clone();
            tokio::task::spawn_blocking(move || serve(server, &path, &cancel, &state, result_tx))
        };

        ListenerHandle {
            addr,
            redirect_uri,
            state,
            cancel,
            result_rx,
            task: Some(task),
        }
    }

    /// Serve until one callback arrives, `timeout` elapses or `cancel` fires
    pub async fn run(
        self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationCode, FlowError> {
        self.spawn(cancel).wait(timeout).await
    }
}

/// A running listener. Dropping it without waiting stops the serving loop.
pub struct ListenerHandle {
    addr: SocketAddr,
    redirect_uri: String,
    state: Arc<Mutex<ListenerState>>,
    cancel: CancellationToken,
    result_rx: oneshot::Receiver<CallbackResult>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    /// Wait for the callback result.
    ///
    /// Always shuts the listener down and checks the port is free before
    /// returning, whatever the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<AuthorizationCode, FlowError> {
        let outcome = tokio::select! {
            biased;
            received = &mut self.result_rx => received.map_err(|_| {
                FlowError::ListenerFailed("listener exited without a result".to_string())
            }),
            _ = self.cancel.cancelled() => Err(FlowError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(FlowError::Timeout(timeout)),
        };

        let shutdown = self.shutdown().await;

        settle(outcome, shutdown)
    }

    async fn shutdown(&mut self) -> Result<(), FlowError> {
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| FlowError::ListenerFailed(e.to_string()))?;
        }

        wait_for_port_release(self.addr).await
    }
}

/// Combine the wait outcome with the shutdown check.
///
/// A usable code is only returned once the port is free. On every other path
/// the original error wins over a release failure.
fn settle(
    outcome: Result<CallbackResult, FlowError>,
    shutdown: Result<(), FlowError>,
) -> Result<AuthorizationCode, FlowError> {
    match outcome.and_then(CallbackResult::into_code) {
        Ok(code) => {
            shutdown?;
            Ok(code)
        }
        Err(e) => {
            if let Err(shutdown_err) = shutdown {
                warn!("Callback listener shutdown failed: {}", shutdown_err);
            }
            Err(e)
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        // Serving loop notices within one poll interval and drops the server
        self.cancel.cancel();
    }
}

fn serve(
    server: Server,
    path: &str,
    cancel: &CancellationToken,
    state: &Mutex<ListenerState>,
    result_tx: oneshot::Sender<CallbackResult>,
) {
    let mut slot = Some(result_tx);

    // Keeps answering after the first result until the waiter shuts us down,
    // so late browser requests never hang on an unanswered connection
    while !cancel.is_cancelled() {
        let request = match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                warn!("Callback listener receive error: {}", e);
                break;
            }
        };

        if slot.is_none() {
            reject_late(request, path);
            continue;
        }

        let Some((request, result)) = accept_callback(request, path) else {
            continue;
        };

        // Published before the page goes out, so the browser never sees a
        // response the flow has not recorded
        let page = result_page(&result);
        *state.lock() = ListenerState::Completed {
            authorized: matches!(result, CallbackResult::Authorized(_)),
        };
        if let Some(tx) = slot.take() {
            if tx.send(result).is_err() {
                debug!("Callback result dropped, nobody is waiting");
            }
        }
        respond(request, 200, page);
    }

    // Requests already queued are not answered by dropping the server
    while let Ok(Some(request)) = server.try_recv() {
        reject_late(request, path);
    }

    if slot.is_some() {
        *state.lock() = ListenerState::Cancelled;
    }

    drop(server);
    debug!("Callback listener stopped");
}

/// Answer a request arriving after the callback was already consumed
fn reject_late(request: Request, path: &str) {
    let on_route = Url::parse("http://localhost/")
        .and_then(|base| base.join(request.url()))
        .is_ok_and(|url| url.path() == path);

    if on_route {
        debug!("Callback already received, rejecting {}", request.url());
        respond(request, 409, ALREADY_COMPLETED_PAGE.to_string());
    } else {
        respond(request, 404, "Not Found".to_string());
    }
}

/// Answer requests that are not a callback. A callback request is handed
/// back unanswered together with its result.
fn accept_callback(request: Request, path: &str) -> Option<(Request, CallbackResult)> {
    let url = Url::parse("http://localhost/")
        .and_then(|base| base.join(request.url()))
        .ok();

    let Some(url) = url.filter(|url| url.path() == path) else {
        debug!("Ignoring request for {}", request.url());
        respond(request, 404, "Not Found".to_string());
        return None;
    };

    if request.method() != &Method::Get {
        debug!("Ignoring {} request on callback route", request.method());
        respond(request, 405, "Method Not Allowed".to_string());
        return None;
    }

    let result = CallbackResult::from_url(&url);
    Some((request, result))
}

fn result_page(result: &CallbackResult) -> String {
    match result {
        CallbackResult::Authorized(_) => SUCCESS_PAGE.to_string(),
        CallbackResult::Denied(reason) => failure_page(reason),
        CallbackResult::Empty => failure_page("no authorization code received"),
    }
}

fn respond(request: Request, status: u16, body: String) {
    let mut response: Response<Cursor<Vec<u8>>> =
        Response::from_data(body.into_bytes()).with_status_code(StatusCode(status));
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
    {
        response.add_header(header);
    }

    if let Err(e) = request.respond(response) {
        warn!("Failed to answer callback request: {}", e);
    }
}

async fn wait_for_port_release(addr: SocketAddr) -> Result<(), FlowError> {
    let deadline = Instant::now() + PORT_RELEASE_GRACE;

    loop {
        match std::net::TcpListener::bind(addr) {
            Ok(probe) => {
                drop(probe);
                debug!("Callback port {} released", addr);
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if Instant::now() >= deadline {
                    return Err(FlowError::PortNotReleased(addr));
                }
                tokio::time::sleep(PORT_PROBE_INTERVAL).await;
            }
            Err(e) => {
                debug!("Port probe on {} inconclusive: {}", addr, e);
                return Ok(());
            }
        }
    }
}

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
<h1>Authentication Successful</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#;

const ALREADY_COMPLETED_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Already Completed</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
<h1>Login Already Completed</h1>
<p>This login has already received its callback. You can close this window.</p>
</body>
</html>"#;

fn failure_page(reason: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authentication Failed</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
<h1>Authentication Failed</h1>
<p>Error: {}</p>
<p>Please run <code>egg login</code> again.</p>
</body>
</html>"#,
        escape_html(reason)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
