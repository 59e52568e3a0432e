use std::convert::Infallible;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt};
use log::{debug, info, warn};
use warp::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;
use warp::ws::{WebSocket, Ws};
use warp::{reply, Filter, Rejection, Reply};

use super::types::{ApiError, ApiMessage, ConnectBody, ConnectionSummary, LogsQuery, PullQuery};
use super::web_server::AppState;
use crate::container_engine::sources;
use crate::error_handling::types::{ErrorKind, TerminalError};
use crate::event_stream::{self, StreamFrame, StreamKind};
use crate::session_management::{ConnectRequest, Session, SessionId, TransportMode};
use crate::terminal::{select_connector, TerminalProxy, WarpSocket};

pub const SESSION_COOKIE: &str = "daas_session";

const MAX_CONNECT_BODY: u64 = 64 * 1024;

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// The caller's session id, if the cookie is present and well formed.
fn session_cookie() -> impl Filter<Extract = (Option<SessionId>,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .map(|raw: Option<String>| raw.as_deref().and_then(SessionId::parse))
}

fn error_reply(message: impl Into<String>, kind: ErrorKind) -> Response {
    let status =
        StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    reply::with_status(
        reply::json(&ApiError {
            error: message.into(),
        }),
        status,
    )
    .into_response()
}

fn summary(session: &Session, with_time: bool) -> ConnectionSummary {
    ConnectionSummary {
        host: session.host_address.clone(),
        mode: session.transport_mode.scheme().to_string(),
        api_url: session.connection_endpoint.clone(),
        connected_at: with_time.then(|| session.created_at.to_rfc3339()),
    }
}

/// `text/event-stream` response whose body is the encoded frames, written
/// as the client reads them. The body ends early once the server starts
/// shutting down, follow streams would otherwise hold it open forever.
fn event_stream_reply<S>(state: &AppState, frames: S) -> Response
where
    S: Stream<Item = StreamFrame> + Send + 'static,
{
    let body = frames
        .take_until(state.stopping())
        .map(|frame| Ok::<_, Infallible>(frame.encode()));
    let mut response = Response::new(Body::wrap_stream(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

fn single_error_frame(message: String) -> impl Stream<Item = StreamFrame> + Send {
    stream::iter([StreamFrame::Error(message)])
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /api/connect
pub fn connect_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "connect")
        .and(warp::post())
        .and(session_cookie())
        .and(warp::body::content_length_limit(MAX_CONNECT_BODY))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(connect)
}

async fn connect(
    previous: Option<SessionId>,
    body: ConnectBody,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let transport_mode = match body.mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("https") => TransportMode::Encrypted,
        Some("http") => TransportMode::Plain,
        Some(other) => {
            return Ok(error_reply(
                format!("Unsupported mode: {}", other),
                ErrorKind::Validation,
            ))
        }
    };
    let request = ConnectRequest {
        host_address: body.host_ip.unwrap_or_default(),
        transport_mode,
        ca_cert: body.ca_cert,
        client_cert: body.client_cert,
        client_key: body.client_key,
    };

    let session = match state.sessions.connect(request).await {
        Ok(session) => session,
        Err(e) => return Ok(error_reply(e.to_string(), e.kind())),
    };
    // a browser holds one session; the one it replaces goes with its bundle
    if let Some(previous) = previous {
        state.sessions.disconnect(&previous);
    }

    let body = ApiMessage {
        success: true,
        message: "Successfully connected to Docker host".to_string(),
        data: Some(summary(&session, false)),
    };
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session.id
    );
    Ok(reply::with_header(reply::json(&body), SET_COOKIE, cookie).into_response())
}

/// POST /api/disconnect
pub fn disconnect_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "disconnect")
        .and(warp::post())
        .and(session_cookie())
        .and(with_state(state))
        .map(|session: Option<SessionId>, state: Arc<AppState>| {
            if let Some(id) = session {
                state.sessions.disconnect(&id);
            }
            let body: ApiMessage<()> = ApiMessage {
                success: true,
                message: "Disconnected successfully.".to_string(),
                data: None,
            };
            let expired = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE);
            reply::with_header(reply::json(&body), SET_COOKIE, expired).into_response()
        })
}

/// GET /api/session
pub fn session_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "session")
        .and(warp::get())
        .and(session_cookie())
        .and(with_state(state))
        .map(|session: Option<SessionId>, state: Arc<AppState>| {
            match session.and_then(|id| state.sessions.session(&id)) {
                Some(session) => reply::json(&ApiMessage {
                    success: true,
                    message: "Connected".to_string(),
                    data: Some(summary(&session, true)),
                })
                .into_response(),
                None => error_reply(
                    "Not connected to any Docker host. Please connect first.",
                    ErrorKind::Credential,
                ),
            }
        })
}

/// GET /api/logs?container=<id>
pub fn logs_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "logs")
        .and(warp::get())
        .and(warp::query::<LogsQuery>())
        .and(session_cookie())
        .and(with_state(state))
        .map(
            |query: LogsQuery, session: Option<SessionId>, state: Arc<AppState>| {
                let container = match non_blank(query.container) {
                    Some(container) => container,
                    None => return error_reply("Container ID is required", ErrorKind::Validation),
                };
                let descriptor = match state.resolve(session.as_ref()) {
                    Ok(descriptor) => descriptor,
                    Err(e) => return error_reply(e.to_string(), e.kind()),
                };
                info!("Log stream requested for {}", container);
                event_stream_reply(
                    &state,
                    event_stream::open(
                        StreamKind::Logs,
                        sources::open_logs(descriptor, container, state.log_tail),
                    ),
                )
            },
        )
}

/// GET /api/containers/<id>/stats
pub fn stats_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "containers" / String / "stats")
        .and(warp::get())
        .and(session_cookie())
        .and(with_state(state))
        .map(
            |container: String, session: Option<SessionId>, state: Arc<AppState>| {
                let descriptor = match state.resolve(session.as_ref()) {
                    Ok(descriptor) => descriptor,
                    Err(e) => return error_reply(e.to_string(), e.kind()),
                };
                info!("Usage stream requested for {}", container);
                event_stream_reply(
                    &state,
                    event_stream::open(
                        StreamKind::Usage,
                        sources::open_usage(descriptor, container),
                    ),
                )
            },
        )
}

/// GET /api/pull-image?repository=<name>&tag=<tag>
///
/// Request problems are reported as a single error frame, the pull client
/// only ever reads the event stream.
pub fn pull_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("api" / "pull-image")
        .and(warp::get())
        .and(warp::query::<PullQuery>())
        .and(session_cookie())
        .and(with_state(state))
        .map(
            |query: PullQuery, session: Option<SessionId>, state: Arc<AppState>| {
                let repository = match non_blank(query.repository) {
                    Some(repository) => repository,
                    None => {
                        return event_stream_reply(
                            &state,
                            single_error_frame("Missing repository".to_string()),
                        )
                    }
                };
                let tag = non_blank(query.tag).unwrap_or_else(|| "latest".to_string());
                let descriptor = match state.resolve(session.as_ref()) {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        return event_stream_reply(&state, single_error_frame(e.to_string()))
                    }
                };
                info!("Pull requested for {}:{}", repository, tag);
                event_stream_reply(
                    &state,
                    event_stream::open(
                        StreamKind::Pull,
                        sources::open_pull(descriptor, repository, tag),
                    ),
                )
            },
        )
}

/// GET /ws
pub fn terminal_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(session_cookie())
        .and(with_state(state))
        .map(|ws: Ws, session: Option<SessionId>, state: Arc<AppState>| {
            ws.on_upgrade(move |socket| run_terminal(socket, session, state))
        })
}

async fn run_terminal(socket: WebSocket, session: Option<SessionId>, state: Arc<AppState>) {
    let backend = state
        .resolve(session.as_ref())
        .map_err(TerminalError::from);
    let connector = select_connector(backend, state.ssh.as_ref(), state.engine_timeout);
    let reason = TerminalProxy::new(WarpSocket::new(socket), connector, state.terminal)
        .run()
        .await;
    debug!("Terminal task finished: {:?}", reason);
}

fn cors(allowed_origins: &[String]) -> warp::cors::Cors {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type"])
        .allow_credentials(true);
    if allowed_origins.is_empty() {
        builder.allow_any_origin().build()
    } else {
        builder
            .allow_origins(allowed_origins.iter().map(String::as_str))
            .build()
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
    {
        (StatusCode::BAD_REQUEST, "Invalid request body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "Origin not allowed")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request")
    };
    Ok(reply::with_status(
        reply::json(&ApiError {
            error: message.to_string(),
        }),
        status,
    )
    .into_response())
}

/// Every endpoint, with CORS and JSON rejections.
pub fn routes(
    state: Arc<AppState>,
    allowed_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    connect_route(state.clone())
        .or(disconnect_route(state.clone()))
        .or(session_route(state.clone()))
        .or(logs_route(state.clone()))
        .or(stats_route(state.clone()))
        .or(pull_route(state.clone()))
        .or(terminal_route(state))
        .with(cors(allowed_origins))
        .recover(handle_rejection)
}
