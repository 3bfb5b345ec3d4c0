//! Request dispatch: normalize, validate, match, then run each route.
//!
//! [`Dispatcher::dispatch`] takes one inbound collect request through
//! method gate → payload normalization → shape validation → route
//! matching → sequential per-route auth, transform and forward, and
//! turns the per-route [`ExecutionResult`]s into one response.
//! A failure in one route never stops its siblings. Routes run one after
//! another, each logged before the next starts.
//!
//! [`Dispatcher::dry_run`] performs the same matching, auth and
//! transform steps without calling the transport.

use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};

use super::auth::{authenticate, client_ip, RequestIdentity};
use super::forward::{classify, ForwardError, Transport};
use super::normalize::{payload_from_body, payload_from_query, validate_payload, PayloadError};
use super::outcome::{ExecutionResult, OutcomeKind, OutcomeRecord, OutcomeSink};
use super::routing::{Route, RouteTable};
use crate::template::{RequestMeta, TemplateError, TemplateStore};

pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-route error codes raised before the transport is called.
pub const AUTH_FAILED: &str = "AUTH_FAILED";
pub const TEMPLATE_ERROR: &str = "TEMPLATE_ERROR";

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Put the real error text in response bodies.
    pub verbose_errors: bool,
    /// Per-attempt outbound timeout.
    pub timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            verbose_errors: false,
            timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }
}

/// Everything the dispatcher needs from an inbound HTTP request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
    pub remote_addr: Option<IpAddr>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub status: StatusCode,
    pub body: Value,
    /// Set on `405`.
    pub allow: Option<String>,
}

impl DispatchResponse {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            allow: None,
        }
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "status": "error", "error": message }),
            allow: None,
        }
    }
}

impl IntoResponse for DispatchResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(allow) = self.allow.and_then(|a| HeaderValue::from_str(&a).ok()) {
            response.headers_mut().insert(header::ALLOW, allow);
        }
        response
    }
}

/// Public message for failed routes, picked by their error codes.
///
/// Route names, targets and template paths never feed into it.
#[must_use]
pub fn generic_message(results: &[ExecutionResult]) -> &'static str {
    let auth_failed = results
        .iter()
        .any(|r| !r.success && r.code.as_deref() == Some(AUTH_FAILED));
    if auth_failed {
        "Forbidden"
    } else {
        "Internal Server Error"
    }
}

/// Per-request state shared by every route execution.
struct RequestContext<'a> {
    request: &'a InboundRequest,
    method: &'a str,
    event: String,
    payload: Value,
    client_ip: String,
    meta: RequestMeta,
}

impl RequestContext<'_> {
    fn identity(&self) -> RequestIdentity<'_> {
        RequestIdentity {
            headers: &self.request.headers,
            client_ip: &self.client_ip,
        }
    }
}

pub struct Dispatcher {
    table: RouteTable,
    templates: Arc<TemplateStore>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn OutcomeSink>,
    settings: DispatchSettings,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        table: RouteTable,
        templates: Arc<TemplateStore>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn OutcomeSink>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            table,
            templates,
            transport,
            sink,
            settings,
        }
    }

    #[must_use]
    pub const fn table(&self) -> &RouteTable {
        &self.table
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub async fn dispatch(&self, request: InboundRequest) -> DispatchResponse {
        let method = request.method.as_str();

        if !self.table.allows_method(method) {
            let allow = self
                .table
                .allowed_methods()
                .into_iter()
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                correlation_id = %request.correlation_id,
                method = %method,
                allow = %allow,
                "method not allowed"
            );
            self.emit(&request, OutcomeKind::MethodNotAllowed, None, Vec::new(), None);
            return DispatchResponse {
                allow: Some(allow),
                ..DispatchResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
            };
        }

        let ctx = match self.prepare(&request) {
            Ok(ctx) => ctx,
            Err(e) => return self.reject(&request, &e, OutcomeKind::ValidationError),
        };

        let matched = self.table.find_matches(&ctx.event, ctx.method);
        tracing::info!(
            correlation_id = %request.correlation_id,
            event = %ctx.event,
            method = %method,
            matched = matched.len(),
            "event received"
        );

        if matched.is_empty() {
            return self.unmatched(&ctx).await;
        }

        let mut results = Vec::with_capacity(matched.len());
        for route in matched {
            results.push(self.execute(route, &ctx).await);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        if succeeded > 0 {
            self.emit(&request, OutcomeKind::Success, Some(&ctx.event), results, None);
            DispatchResponse::ok(json!({ "status": "success", "processed": succeeded }))
        } else {
            let detail = results
                .iter()
                .map(|r| format!("{}: {}", r.route, r.error.as_deref().unwrap_or("failed")))
                .collect::<Vec<_>>()
                .join("; ");
            tracing::error!(
                correlation_id = %request.correlation_id,
                event = %ctx.event,
                error = %detail,
                "all routes failed"
            );
            let response = self.failure_response(&detail, &results);
            self.emit(&request, OutcomeKind::Failed, Some(&ctx.event), results, Some(detail));
            response
        }
    }

    /// Match, authenticate and transform, but never forward.
    pub async fn dry_run(&self, request: &InboundRequest) -> DispatchResponse {
        let ctx = match self.prepare(request) {
            Ok(ctx) => ctx,
            Err(e) => return self.reject(request, &e, OutcomeKind::DryRun),
        };

        let matched = self.table.find_matches(&ctx.event, ctx.method);
        let (routes, fallback) = if matched.is_empty() {
            match self.usable_fallback(ctx.method) {
                Some(route) => (vec![route], true),
                None => (Vec::new(), false),
            }
        } else {
            (matched, false)
        };

        let mut previews = Vec::with_capacity(routes.len());
        for route in routes {
            previews.push(self.preview(route, &ctx).await);
        }

        tracing::info!(
            correlation_id = %request.correlation_id,
            event = %ctx.event,
            matched = previews.len(),
            fallback,
            "dry run"
        );
        self.emit(request, OutcomeKind::DryRun, Some(&ctx.event), Vec::new(), None);

        if previews.is_empty() {
            return DispatchResponse::ok(json!({
                "status": "unmatched",
                "event": ctx.event,
                "dry_run": true,
            }));
        }

        DispatchResponse::ok(json!({
            "status": "dry_run",
            "event": ctx.event,
            "matched": previews.len(),
            "fallback": fallback,
            "results": previews,
        }))
    }

    fn prepare<'a>(&self, request: &'a InboundRequest) -> Result<RequestContext<'a>, PayloadError> {
        let payload = if request.method == Method::GET {
            payload_from_query(request.query.as_deref().unwrap_or_default())
        } else {
            payload_from_body(&request.body)?
        };
        let event = validate_payload(&payload)?.to_string();

        let client_ip = client_ip(&request.headers, request.remote_addr);
        let meta = RequestMeta {
            ip: client_ip.clone(),
            user_agent: request
                .headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            timestamp: now_rfc3339(),
        };

        Ok(RequestContext {
            request,
            method: request.method.as_str(),
            event,
            payload,
            client_ip,
            meta,
        })
    }

    /// `kind` is [`OutcomeKind::DryRun`] for previews so they stay out of the stats.
    fn reject(
        &self,
        request: &InboundRequest,
        err: &PayloadError,
        kind: OutcomeKind,
    ) -> DispatchResponse {
        let detail = err.to_string();
        tracing::warn!(
            correlation_id = %request.correlation_id,
            error = %detail,
            "validation_error"
        );
        let message = if self.settings.verbose_errors {
            detail.as_str()
        } else {
            "Bad Request"
        };
        let response = DispatchResponse::error(StatusCode::BAD_REQUEST, message);
        self.emit(request, kind, None, Vec::new(), Some(detail));
        response
    }

    fn usable_fallback(&self, method: &str) -> Option<&Route> {
        self.table.fallback().filter(|r| r.allows_method(method))
    }

    async fn unmatched(&self, ctx: &RequestContext<'_>) -> DispatchResponse {
        let request = ctx.request;

        let Some(route) = self.usable_fallback(ctx.method) else {
            tracing::info!(
                correlation_id = %request.correlation_id,
                event = %ctx.event,
                "unmatched"
            );
            self.emit(request, OutcomeKind::Unmatched, Some(&ctx.event), Vec::new(), None);
            return DispatchResponse::ok(json!({ "status": "unmatched", "event": ctx.event }));
        };

        tracing::info!(
            correlation_id = %request.correlation_id,
            event = %ctx.event,
            route = %route.name,
            "no route matched, using fallback"
        );
        let result = self.execute(route, ctx).await;
        let response = if result.success {
            DispatchResponse::ok(json!({ "status": "success", "processed": 1, "fallback": true }))
        } else {
            let detail = result.error.as_deref().unwrap_or("fallback route failed");
            self.failure_response(detail, std::slice::from_ref(&result))
        };
        self.emit(request, OutcomeKind::Fallback, Some(&ctx.event), vec![result], None);
        response
    }

    fn failure_response(&self, detail: &str, results: &[ExecutionResult]) -> DispatchResponse {
        let message = if self.settings.verbose_errors {
            detail
        } else {
            generic_message(results)
        };
        DispatchResponse::error(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Outbound body: the rendered template, or the payload itself.
    async fn outbound_body<'c>(
        &self,
        route: &Route,
        ctx: &'c RequestContext<'_>,
    ) -> Result<Cow<'c, Value>, TemplateError> {
        match &route.template {
            Some(template) => self
                .templates
                .process(template, &ctx.payload, &ctx.meta)
                .await
                .map(Cow::Owned),
            None => Ok(Cow::Borrowed(&ctx.payload)),
        }
    }

    async fn execute(&self, route: &Route, ctx: &RequestContext<'_>) -> ExecutionResult {
        let start = Instant::now();
        let outcome = self.try_execute(route, ctx).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(status) => ExecutionResult {
                route: route.name.clone(),
                target_url: route.target_url.clone(),
                success: true,
                status: Some(status),
                error: None,
                code: None,
                latency_ms,
            },
            Err(failure) => ExecutionResult {
                route: route.name.clone(),
                target_url: route.target_url.clone(),
                success: false,
                status: failure.status,
                error: Some(failure.message),
                code: Some(failure.code),
                latency_ms,
            },
        };

        let correlation_id = &ctx.request.correlation_id;
        if result.success {
            tracing::info!(
                correlation_id = %correlation_id,
                event = %ctx.event,
                route = %result.route,
                target = %result.target_url,
                status = result.status.unwrap_or_default(),
                latency_ms,
                "route forwarded"
            );
        } else {
            tracing::warn!(
                correlation_id = %correlation_id,
                event = %ctx.event,
                route = %result.route,
                target = %result.target_url,
                code = result.code.as_deref().unwrap_or_default(),
                error = result.error.as_deref().unwrap_or_default(),
                latency_ms,
                "route failed"
            );
        }
        result
    }

    async fn try_execute(&self, route: &Route, ctx: &RequestContext<'_>) -> Result<u16, RouteFailure> {
        authenticate(&ctx.identity(), &route.auth).map_err(|e| RouteFailure {
            message: e.to_string(),
            code: AUTH_FAILED.into(),
            status: None,
        })?;

        let body = self
            .outbound_body(route, ctx)
            .await
            .map_err(|e| RouteFailure {
                message: e.to_string(),
                code: TEMPLATE_ERROR.into(),
                status: None,
            })?;
        let body = serde_json::to_vec(&*body).map_err(|e| RouteFailure {
            message: format!("failed to serialize payload: {e}"),
            code: TEMPLATE_ERROR.into(),
            status: None,
        })?;

        self.transport
            .post(
                &route.target_url,
                &route.headers,
                Bytes::from(body),
                self.settings.timeout,
            )
            .await
            .and_then(classify)
            .map_err(RouteFailure::from)
    }

    async fn preview(&self, route: &Route, ctx: &RequestContext<'_>) -> Value {
        let mut entry = json!({
            "route": route.name,
            "target_url": route.target_url,
            "auth": route.auth.kind(),
        });

        let outcome = match authenticate(&ctx.identity(), &route.auth) {
            Ok(()) => self
                .outbound_body(route, ctx)
                .await
                .map(Cow::into_owned)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(payload) => {
                entry["would_forward"] = Value::Bool(true);
                entry["payload"] = payload;
            }
            Err(error) => {
                entry["would_forward"] = Value::Bool(false);
                entry["error"] = Value::String(error);
            }
        }
        entry
    }

    fn emit(
        &self,
        request: &InboundRequest,
        kind: OutcomeKind,
        event: Option<&str>,
        results: Vec<ExecutionResult>,
        message: Option<String>,
    ) {
        self.sink.record(OutcomeRecord {
            timestamp: now_rfc3339(),
            correlation_id: request.correlation_id.clone(),
            kind,
            method: request.method.to_string(),
            event: event.map(String::from),
            results,
            message,
        });
    }
}

struct RouteFailure {
    message: String,
    code: String,
    status: Option<u16>,
}

impl From<ForwardError> for RouteFailure {
    fn from(e: ForwardError) -> Self {
        let status = match &e {
            ForwardError::HttpStatus(s) => Some(*s),
            _ => None,
        };
        Self {
            message: e.to_string(),
            code: e.code(),
            status,
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::gateway::auth::AuthStrategy;

    /// Records every POST and answers with a scripted status per URL.
    #[derive(Default)]
    struct FakeTransport {
        sent: Mutex<Vec<(String, Value)>>,
        script: HashMap<String, Result<u16, ForwardError>>,
    }

    impl FakeTransport {
        fn answering(script: &[(&str, Result<u16, ForwardError>)]) -> Self {
            Self {
                sent: Mutex::default(),
                script: script
                    .iter()
                    .map(|(url, r)| ((*url).to_string(), r.clone()))
                    .collect(),
            }
        }

        fn sent(&self) -> Vec<(String, Value)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post(
            &self,
            url: &str,
            _headers: &HeaderMap,
            body: Bytes,
            _timeout: Duration,
        ) -> Result<u16, ForwardError> {
            let value: Value = serde_json::from_slice(&body).unwrap();
            self.sent.lock().unwrap().push((url.to_string(), value));
            self.script.get(url).cloned().unwrap_or(Ok(200))
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<OutcomeRecord>>);

    impl OutcomeSink for RecordingSink {
        fn record(&self, record: OutcomeRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn route(name: &str, pattern: &str) -> Route {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Route {
            name: name.into(),
            event_match: pattern.into(),
            target_url: format!("http://target/{name}"),
            methods: vec!["POST".into()],
            template: None,
            auth: AuthStrategy::ApiKey { key: "k".into() },
            priority: None,
            multi: false,
            fallback: false,
            headers,
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        transport: Arc<FakeTransport>,
        sink: Arc<RecordingSink>,
        dir: tempfile::TempDir,
    }

    fn harness(routes: Vec<Route>, transport: FakeTransport, verbose: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("purchase.json"),
            r#"{"currency": "{{events.0.params.currency || 'USD'}}", "ip": "{{meta.ip}}"}"#,
        )
        .unwrap();
        let templates = Arc::new(TemplateStore::new(dir.path()));
        templates.preload(["purchase.json"]).unwrap();

        let transport = Arc::new(transport);
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            RouteTable::new(routes),
            templates,
            transport.clone(),
            sink.clone(),
            DispatchSettings {
                verbose_errors: verbose,
                ..DispatchSettings::default()
            },
        );
        Harness {
            dispatcher,
            transport,
            sink,
            dir,
        }
    }

    fn post(body: Value) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        InboundRequest {
            method: Method::POST,
            headers,
            query: None,
            body: Bytes::from(body.to_string()),
            remote_addr: Some(IpAddr::from([192, 0, 2, 1])),
            correlation_id: "cid-1".into(),
        }
    }

    fn purchase() -> Value {
        json!({"events": [{"name": "purchase", "params": {"value": 10}}]})
    }

    #[tokio::test]
    async fn template_route_forwards_rendered_body() {
        let mut r = route("ga", "purchase");
        r.template = Some("purchase.json".into());
        let h = harness(vec![r], FakeTransport::default(), false);

        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, json!({"status": "success", "processed": 1}));
        assert_eq!(
            h.transport.sent(),
            vec![(
                "http://target/ga".to_string(),
                json!({"currency": "USD", "ip": "192.0.2.1"})
            )]
        );
    }

    #[tokio::test]
    async fn passthrough_forwards_payload_unchanged() {
        let h = harness(vec![route("raw", "*")], FakeTransport::default(), false);
        h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(h.transport.sent()[0].1, purchase());
    }

    #[tokio::test]
    async fn unmatched_without_fallback_is_200() {
        let h = harness(vec![route("ga", "purchase")], FakeTransport::default(), false);
        let resp = h
            .dispatcher
            .dispatch(post(json!({"events": [{"name": "page_view"}]})))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body, json!({"status": "unmatched", "event": "page_view"}));
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.sink.0.lock().unwrap()[0].kind, OutcomeKind::Unmatched);
    }

    #[tokio::test]
    async fn fallback_runs_when_nothing_matches() {
        let mut fb = route("fb", "ignored");
        fb.fallback = true;
        let h = harness(
            vec![route("ga", "purchase"), fb],
            FakeTransport::default(),
            false,
        );
        let resp = h
            .dispatcher
            .dispatch(post(json!({"events": [{"name": "page_view"}]})))
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["fallback"], true);
        assert_eq!(h.transport.sent()[0].0, "http://target/fb");
    }

    #[tokio::test]
    async fn failing_fallback_is_500() {
        let mut fb = route("fb", "*");
        fb.fallback = true;
        let h = harness(
            vec![fb],
            FakeTransport::answering(&[("http://target/fb", Ok(503))]),
            true,
        );
        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body["error"], "target responded with HTTP 503");
    }

    #[tokio::test]
    async fn multi_routes_run_in_order_and_fail_independently() {
        let mut r1 = route("first", "*");
        r1.multi = true;
        let mut r2 = route("second", "purchase");
        r2.auth = AuthStrategy::ApiKey { key: "other".into() };
        r2.multi = true;
        let r3 = route("third", "purchase");
        let r4 = route("never", "purchase");

        let h = harness(
            vec![r1, r2, r3, r4],
            FakeTransport::answering(&[("http://target/first", Ok(500))]),
            false,
        );
        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["processed"], 1);

        let urls: Vec<String> = h.transport.sent().into_iter().map(|(u, _)| u).collect();
        assert_eq!(urls, vec!["http://target/first", "http://target/third"]);

        let records = h.sink.0.lock().unwrap();
        let results = &records[0].results;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].code.as_deref(), Some("HTTP_500"));
        assert_eq!(results[0].status, Some(500));
        assert_eq!(results[1].code.as_deref(), Some("AUTH_FAILED"));
        assert!(results[2].success);
    }

    #[tokio::test]
    async fn all_failed_is_500_with_generic_message() {
        let mut r = route("ga", "purchase");
        r.auth = AuthStrategy::ApiKey { key: "other".into() };
        let h = harness(vec![r], FakeTransport::default(), false);
        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body["error"], "Forbidden");
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn all_failed_verbose_joins_errors() {
        let mut r1 = route("a", "*");
        r1.multi = true;
        let r2 = route("b", "*");
        let h = harness(
            vec![r1, r2],
            FakeTransport::answering(&[
                ("http://target/a", Err(ForwardError::Timeout(DEFAULT_FORWARD_TIMEOUT))),
                ("http://target/b", Err(ForwardError::NoResponse("connection refused".into()))),
            ]),
            true,
        );
        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            resp.body["error"],
            "a: request timed out after 30000ms; b: no response from target: connection refused"
        );
        let records = h.sink.0.lock().unwrap();
        assert_eq!(records[0].kind, OutcomeKind::Failed);
        assert_eq!(records[0].results[0].code.as_deref(), Some("ECONNABORTED"));
        assert_eq!(records[0].results[1].code.as_deref(), Some("NO_RESPONSE"));
    }

    #[tokio::test]
    async fn target_4xx_counts_as_delivered() {
        let h = harness(
            vec![route("ga", "*")],
            FakeTransport::answering(&[("http://target/ga", Ok(422))]),
            false,
        );
        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_payload_is_400() {
        let h = harness(vec![route("ga", "*")], FakeTransport::default(), false);
        let resp = h.dispatcher.dispatch(post(json!({"events": []}))).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "Bad Request");

        let h = harness(vec![route("ga", "*")], FakeTransport::default(), true);
        let resp = h.dispatcher.dispatch(post(json!({"events": []}))).await;
        assert_eq!(
            resp.body["error"],
            "payload must contain a non-empty 'events' array"
        );
        assert_eq!(h.sink.0.lock().unwrap()[0].kind, OutcomeKind::ValidationError);
    }

    #[tokio::test]
    async fn undeclared_method_is_405_with_allow() {
        let h = harness(vec![route("ga", "*")], FakeTransport::default(), false);
        let mut req = post(purchase());
        req.method = Method::GET;
        let resp = h.dispatcher.dispatch(req).await;
        assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.allow.as_deref(), Some("POST"));
    }

    #[tokio::test]
    async fn get_query_is_normalized_and_routed() {
        let mut r = route("ga", "page_view");
        r.methods = vec!["GET".into()];
        let h = harness(vec![r], FakeTransport::default(), false);

        let mut req = post(json!({}));
        req.method = Method::GET;
        req.body = Bytes::new();
        req.query = Some("en=page_view&cid=42&epn.value=3".into());

        let resp = h.dispatcher.dispatch(req).await;
        assert_eq!(resp.status, StatusCode::OK);
        let sent = &h.transport.sent()[0].1;
        assert_eq!(sent["client_id"], "42");
        assert_eq!(sent["events"][0]["params"]["value"], 3);
    }

    #[tokio::test]
    async fn vanished_template_fails_only_that_route() {
        let mut templated = route("templated", "*");
        templated.template = Some("purchase.json".into());
        templated.multi = true;
        let raw = route("raw", "*");

        let h = harness(vec![templated, raw], FakeTransport::default(), false);
        h.dispatcher.templates().invalidate();
        std::fs::remove_file(h.dir.path().join("purchase.json")).unwrap();

        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["processed"], 1);
        let records = h.sink.0.lock().unwrap();
        assert_eq!(records[0].results[0].code.as_deref(), Some("TEMPLATE_ERROR"));
    }

    #[tokio::test]
    async fn dry_run_previews_without_forwarding() {
        let mut ok = route("ok", "*");
        ok.template = Some("purchase.json".into());
        ok.multi = true;
        let mut denied = route("denied", "*");
        denied.auth = AuthStrategy::Origin {
            origins: vec!["https://shop.example".into()],
        };

        let h = harness(vec![ok, denied], FakeTransport::default(), false);
        let resp = h.dispatcher.dry_run(&post(purchase())).await;

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body["status"], "dry_run");
        assert_eq!(resp.body["matched"], 2);
        let results = resp.body["results"].as_array().unwrap();
        assert_eq!(results[0]["would_forward"], true);
        assert_eq!(results[0]["payload"]["currency"], "USD");
        assert_eq!(results[0]["target_url"], "http://target/ok");
        assert_eq!(results[1]["would_forward"], false);
        assert_eq!(
            results[1]["error"],
            "authentication failed: missing Origin header"
        );
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn dry_run_unmatched() {
        let h = harness(vec![route("ga", "purchase")], FakeTransport::default(), false);
        let resp = h
            .dispatcher
            .dry_run(&post(json!({"events": [{"name": "other"}]})))
            .await;
        assert_eq!(resp.body["status"], "unmatched");
        assert_eq!(resp.body["dry_run"], true);
    }

    #[tokio::test]
    async fn dry_run_rejection_is_recorded_as_dry_run() {
        let h = harness(vec![route("ga", "*")], FakeTransport::default(), false);
        let resp = h.dispatcher.dry_run(&post(json!({"events": []}))).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.body["error"], "Bad Request");

        let records = h.sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, OutcomeKind::DryRun);
    }

    #[tokio::test]
    async fn generic_message_ignores_route_names() {
        let mut mirror = route("origin-mirror", "*");
        mirror.multi = true;
        let orders = route("missing-orders", "*");
        let h = harness(
            vec![mirror, orders],
            FakeTransport::answering(&[
                ("http://target/origin-mirror", Ok(502)),
                (
                    "http://target/missing-orders",
                    Err(ForwardError::Timeout(DEFAULT_FORWARD_TIMEOUT)),
                ),
            ]),
            false,
        );
        let resp = h.dispatcher.dispatch(post(purchase())).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn failing_fallback_named_like_auth_is_internal_error() {
        let mut fallback = route("forbidden-archive", "*");
        fallback.fallback = true;
        let h = harness(
            vec![route("ga", "purchase"), fallback],
            FakeTransport::answering(&[("http://target/forbidden-archive", Ok(503))]),
            false,
        );
        let resp = h
            .dispatcher
            .dispatch(post(json!({"events": [{"name": "other"}]})))
            .await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body["error"], "Internal Server Error");
    }

    fn failed(code: &str) -> ExecutionResult {
        ExecutionResult {
            route: "r".into(),
            target_url: "http://target/r".into(),
            success: false,
            status: None,
            error: Some("authentication failed: invalid API key".into()),
            code: Some(code.into()),
            latency_ms: 0,
        }
    }

    #[test]
    fn generic_messages() {
        assert_eq!(generic_message(&[failed(AUTH_FAILED)]), "Forbidden");
        assert_eq!(
            generic_message(&[failed("HTTP_502"), failed(AUTH_FAILED)]),
            "Forbidden"
        );
        assert_eq!(generic_message(&[failed(TEMPLATE_ERROR)]), "Internal Server Error");
        assert_eq!(generic_message(&[failed("ECONNABORTED")]), "Internal Server Error");
    }

    #[test]
    fn allow_header_set_on_response() {
        let resp = DispatchResponse {
            allow: Some("GET, POST".into()),
            ..DispatchResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        .into_response();
        assert_eq!(resp.headers().get(header::ALLOW).unwrap(), "GET, POST");
    }
}
