//! Route dispatch: handlers return a value (or fail) and the adapter sends it once, with a
//! status chosen by HTTP method and an optional body templater.

use crate::error::{ApiError, AppError};
use crate::filter::query_string::expand_pairs;
use crate::filter::QueryParams;
use crate::http::mapper::handle_error;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// Response ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl Reply {
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        Reply { status, body }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) if self.status != StatusCode::NO_CONTENT => (self.status, Json(body)).into_response(),
            _ => self.status.into_response(),
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    sent: bool,
    reply: Option<Reply>,
}

/// One-shot response holder shared by every completion path of a request.
/// The first `send` wins; later ones are ignored.
#[derive(Clone, Debug, Default)]
pub struct ResponseSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl ResponseSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_sent(&self) -> bool {
        self.lock().sent
    }

    /// Returns `false` when a response was already sent.
    pub fn send(&self, reply: Reply) -> bool {
        let mut state = self.lock();
        if state.sent {
            return false;
        }
        state.sent = true;
        state.reply = Some(reply);
        true
    }

    /// Take the reply for writing. The slot stays marked as sent.
    pub fn take(&self) -> Option<Reply> {
        self.lock().reply.take()
    }
}

/// Success status per request method.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusCodes {
    pub get: StatusCode,
    pub post: StatusCode,
    pub put: StatusCode,
    pub patch: StatusCode,
    pub delete: StatusCode,
    pub fallback: StatusCode,
}

impl Default for StatusCodes {
    fn default() -> Self {
        StatusCodes {
            get: StatusCode::OK,
            post: StatusCode::CREATED,
            put: StatusCode::OK,
            patch: StatusCode::OK,
            delete: StatusCode::NO_CONTENT,
            fallback: StatusCode::OK,
        }
    }
}

impl StatusCodes {
    pub fn for_method(&self, method: &Method) -> StatusCode {
        match *method {
            Method::GET => self.get,
            Method::POST => self.post,
            Method::PUT => self.put,
            Method::PATCH => self.patch,
            Method::DELETE => self.delete,
            _ => self.fallback,
        }
    }
}

/// What a templater sees of the request.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
}

pub type Templater = Arc<dyn Fn(&RequestInfo, Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct DispatchOptions {
    pub status_codes: StatusCodes,
    /// Rewrites every success body before it is sent.
    pub templater: Option<Templater>,
}

/// Everything a handler gets about its request.
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub path_params: HashMap<String, String>,
    /// Query string expanded into nested params (`author[name]=x`).
    pub query: QueryParams,
    /// Parsed JSON body; `null` when the request had none.
    pub body: Value,
    pub headers: HeaderMap,
    pub state: AppState,
    /// Lets a handler answer by itself; its return value is then discarded.
    pub slot: ResponseSlot,
}

impl RequestContext {
    pub fn param(&self, name: &str) -> Result<&str, AppError> {
        self.path_params
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ApiError::bad_request(format!("missing path parameter '{}'", name)).into())
    }

    /// Body as a JSON object.
    pub fn body_object(&self) -> Result<QueryParams, AppError> {
        match &self.body {
            Value::Object(map) => Ok(map.clone()),
            _ => Err(ApiError::bad_request("body must be a JSON object").into()),
        }
    }

    fn info(&self) -> RequestInfo {
        RequestInfo {
            method: self.method.clone(),
            uri: self.uri.clone(),
        }
    }
}

/// Router whose handlers go through the dispatch contract.
pub struct Routes {
    router: Router<AppState>,
    options: Arc<DispatchOptions>,
}

impl Default for Routes {
    fn default() -> Self {
        Routes::new(DispatchOptions::default())
    }
}

impl Routes {
    pub fn new(options: DispatchOptions) -> Self {
        Routes {
            router: Router::new(),
            options: Arc::new(options),
        }
    }

    pub fn get<H, Fut, T>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.add(MethodFilter::GET, path, handler)
    }

    pub fn post<H, Fut, T>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.add(MethodFilter::POST, path, handler)
    }

    pub fn put<H, Fut, T>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.add(MethodFilter::PUT, path, handler)
    }

    pub fn patch<H, Fut, T>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.add(MethodFilter::PATCH, path, handler)
    }

    pub fn delete<H, Fut, T>(self, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.add(MethodFilter::DELETE, path, handler)
    }

    fn add<H, Fut, T>(mut self, filter: MethodFilter, path: &str, handler: H) -> Self
    where
        H: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let options = self.options.clone();
        let endpoint = move |State(state): State<AppState>,
                             method: Method,
                             OriginalUri(uri): OriginalUri,
                             path_params: Option<Path<HashMap<String, String>>>,
                             Query(pairs): Query<Vec<(String, String)>>,
                             headers: HeaderMap,
                             body: Bytes| {
            let handler = handler.clone();
            let options = options.clone();
            async move {
                let slot = ResponseSlot::default();
                match parse_body(&body) {
                    Ok(body) => {
                        let ctx = RequestContext {
                            method,
                            uri,
                            path_params: path_params.map(|Path(p)| p).unwrap_or_default(),
                            query: expand_pairs(pairs),
                            body,
                            headers,
                            state,
                            slot: slot.clone(),
                        };
                        dispatch(handler, &options, ctx).await;
                    }
                    Err(err) => {
                        handle_error(&err, &slot);
                    }
                }
                match slot.take() {
                    Some(reply) => reply.into_response(),
                    None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                }
            }
        };
        self.router = self.router.route(path, on(filter, endpoint));
        self
    }

    pub fn into_router(self) -> Router<AppState> {
        self.router
    }
}

fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {}", e)).into())
}

/// Run one handler and send its outcome through the request's slot.
pub async fn dispatch<H, Fut, T>(handler: H, options: &DispatchOptions, ctx: RequestContext)
where
    H: FnOnce(RequestContext) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    T: Serialize,
{
    let slot = ctx.slot.clone();
    let info = ctx.info();
    match handler(ctx).await {
        Ok(value) => {
            if slot.is_sent() {
                return;
            }
            match serde_json::to_value(&value) {
                Ok(body) => {
                    let body = match &options.templater {
                        Some(templater) => templater(&info, body),
                        None => body,
                    };
                    slot.send(Reply::new(options.status_codes.for_method(&info.method), Some(body)));
                }
                Err(e) => {
                    handle_error(&AppError::Internal(e.to_string()), &slot);
                }
            }
        }
        Err(err) => {
            handle_error(&err, &slot);
        }
    }
}
