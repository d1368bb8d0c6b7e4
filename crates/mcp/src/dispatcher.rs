//! The JSON-RPC method dispatcher.
//!
//! Classification is strict: an envelope with an `id` is a request and
//! produces exactly one response; an envelope without one is a
//! notification and produces none — including on error.  Tool failures
//! are caught here and reduced to an internal-error response; they never
//! surface as transport faults.

use std::sync::Arc;

use serde_json::{json, Value};

use cg_auth::SessionManager;
use cg_tools::{ToolContext, ToolRegistry};

use crate::protocol::{
    ContentBlock, Envelope, InitializeResult, JsonRpcResponse, ServerInfo, ToolCallResult,
    ToolDef, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::registry::SessionRegistry;
use crate::PROTOCOL_VERSION;

/// What the transport layer gets back from a dispatch: at most one
/// response body, plus the session id allocated by `initialize` (surfaced
/// as the `Mcp-Session-Id` response header, not in the JSON-RPC body).
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub response: Option<JsonRpcResponse>,
    pub session_id: Option<String>,
}

impl DispatchOutcome {
    fn none() -> Self {
        Self::default()
    }

    fn respond(response: JsonRpcResponse) -> Self {
        Self {
            response: Some(response),
            session_id: None,
        }
    }
}

pub struct Dispatcher {
    server_info: ServerInfo,
    sessions: Arc<SessionRegistry>,
    tools: Arc<ToolRegistry>,
    auth: Arc<SessionManager>,
}

impl Dispatcher {
    pub fn new(
        server_name: impl Into<String>,
        server_version: impl Into<String>,
        sessions: Arc<SessionRegistry>,
        tools: Arc<ToolRegistry>,
        auth: Arc<SessionManager>,
    ) -> Self {
        Self {
            server_info: ServerInfo {
                name: server_name.into(),
                version: server_version.into(),
            },
            sessions,
            tools,
            auth,
        }
    }

    /// Handle one parsed envelope.  `header_session_id` is the value of
    /// the caller's `mcp-session-id` request header, if any.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        header_session_id: Option<&str>,
    ) -> DispatchOutcome {
        let method = envelope.method.clone().unwrap_or_default();

        match envelope.id {
            Some(id) => self.dispatch_request(id, &method, envelope.params, header_session_id).await,
            None => {
                self.handle_notification(&method);
                DispatchOutcome::none()
            }
        }
    }

    async fn dispatch_request(
        &self,
        id: Value,
        method: &str,
        params: Option<Value>,
        header_session_id: Option<&str>,
    ) -> DispatchOutcome {
        match method {
            "" => DispatchOutcome::respond(JsonRpcResponse::err(
                id,
                INVALID_REQUEST,
                "missing method",
            )),
            "initialize" => self.handle_initialize(id, params),
            "tools/list" => self.handle_tools_list(id, header_session_id),
            "tools/call" => self.handle_tools_call(id, params, header_session_id).await,
            m if m.starts_with("notifications/") => {
                // Notification-class methods never get a response, even
                // when (incorrectly) framed as requests.
                tracing::info!(method = %m, "notification-class method received");
                DispatchOutcome::none()
            }
            other => DispatchOutcome::respond(JsonRpcResponse::err(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "initialize" | "tools/list" | "tools/call" => {
                // Protocol misuse: a request-only method without an id.
                // No response is permitted, so warn and drop.
                tracing::warn!(method = %method, "request-only method framed as notification");
            }
            "notifications/initialized" => {
                tracing::info!("client reported initialization complete");
            }
            m if m.starts_with("notifications/") => {
                tracing::info!(method = %m, "notification received");
            }
            other => {
                tracing::warn!(method = %other, "unknown notification dropped");
            }
        }
    }

    // ── initialize ───────────────────────────────────────────────────

    fn handle_initialize(&self, id: Value, params: Option<Value>) -> DispatchOutcome {
        let params = params.unwrap_or_else(|| json!({}));
        let requested_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_owned();
        let client_info = params.get("clientInfo").cloned().unwrap_or_else(|| json!({}));
        let capabilities = params.get("capabilities").cloned().unwrap_or_else(|| json!({}));

        let session = self
            .sessions
            .create(requested_version, client_info, capabilities);

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: json!({
                "experimental": {},
                "prompts": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
                "tools": { "listChanged": false },
            }),
            server_info: self.server_info.clone(),
        };

        DispatchOutcome {
            response: Some(JsonRpcResponse::ok(
                id,
                serde_json::to_value(result).unwrap_or(Value::Null),
            )),
            session_id: Some(session.session_id),
        }
    }

    // ── tools/list ───────────────────────────────────────────────────

    fn handle_tools_list(&self, id: Value, header_session_id: Option<&str>) -> DispatchOutcome {
        if let Some(sid) = header_session_id {
            if !self.sessions.contains(sid) {
                return DispatchOutcome::respond(JsonRpcResponse::err(
                    id,
                    INVALID_REQUEST,
                    "invalid session id",
                ));
            }
        }

        let tools: Vec<ToolDef> = self
            .tools
            .list()
            .into_iter()
            .map(|spec| ToolDef {
                name: spec.name,
                description: spec.description,
                input_schema: spec.input_schema,
            })
            .collect();

        DispatchOutcome::respond(JsonRpcResponse::ok(id, json!({ "tools": tools })))
    }

    // ── tools/call ───────────────────────────────────────────────────

    async fn handle_tools_call(
        &self,
        id: Value,
        params: Option<Value>,
        header_session_id: Option<&str>,
    ) -> DispatchOutcome {
        let params = params.unwrap_or_else(|| json!({}));
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return DispatchOutcome::respond(JsonRpcResponse::err(
                id,
                INVALID_PARAMS,
                "missing params.name",
            ));
        };

        let Some(tool) = self.tools.get(name) else {
            return DispatchOutcome::respond(JsonRpcResponse::err(
                id,
                INVALID_PARAMS,
                format!("tool not found: {name}"),
            ));
        };

        // The auth flag on the descriptor is the sole gate; tools do not
        // re-check.
        if tool.spec().requires_auth && !self.auth.is_logged_in().await {
            tracing::warn!(tool = %name, "auth-required tool called while logged out");
            return DispatchOutcome::respond(JsonRpcResponse::err(
                id,
                INTERNAL_ERROR,
                format!("tool execution failed: {name} requires a live jAccount session"),
            ));
        }

        let ctx = ToolContext::new(
            self.auth.clone(),
            header_session_id.map(str::to_owned),
        );
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match tool.call(&ctx, arguments).await {
            Ok(value) => {
                let text = match value {
                    Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other).unwrap_or_default(),
                };
                let result = ToolCallResult {
                    content: vec![ContentBlock::text(text)],
                };
                DispatchOutcome::respond(JsonRpcResponse::ok(
                    id,
                    serde_json::to_value(result).unwrap_or(Value::Null),
                ))
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool execution failed");
                DispatchOutcome::respond(JsonRpcResponse::err(
                    id,
                    INTERNAL_ERROR,
                    format!("tool execution failed: {e}"),
                ))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::config::AuthConfig;
    use cg_tools::{Tool, ToolSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: "echo the arguments".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
                requires_auth: false,
            }
        }

        async fn call(&self, _ctx: &ToolContext, args: Value) -> anyhow::Result<Value> {
            Ok(args)
        }
    }

    struct GreetTool;

    #[async_trait::async_trait]
    impl Tool for GreetTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "greet".into(),
                description: "returns a plain string".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
                requires_auth: false,
            }
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
            Ok(Value::String("hello there".into()))
        }
    }

    struct FailingTool;

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "broken".into(),
                description: "always fails".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
                requires_auth: false,
            }
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
            anyhow::bail!("downstream exploded")
        }
    }

    /// Counts invocations so tests can prove the body never ran.
    struct GuardedTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Tool for GuardedTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "guarded".into(),
                description: "requires auth".into(),
                input_schema: json!({ "type": "object", "properties": {} }),
                requires_auth: true,
            }
        }

        async fn call(&self, _ctx: &ToolContext, _args: Value) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("should never happen"))
        }
    }

    fn dispatcher_with(tools: ToolRegistry) -> (Dispatcher, Arc<SessionRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AuthConfig {
            state_path: dir.path().to_path_buf(),
            ..AuthConfig::default()
        };
        std::mem::forget(dir);
        let auth = Arc::new(SessionManager::new(&cfg).unwrap());
        let sessions = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(
            "CampusGate",
            "0.1.0",
            sessions.clone(),
            Arc::new(tools),
            auth,
        );
        (dispatcher, sessions)
    }

    fn default_dispatcher() -> (Dispatcher, Arc<SessionRegistry>) {
        dispatcher_with(
            ToolRegistry::new()
                .register(Arc::new(EchoTool))
                .register(Arc::new(GreetTool))
                .register(Arc::new(FailingTool)),
        )
    }

    fn request(id: Value, method: &str, params: Option<Value>) -> Envelope {
        Envelope {
            jsonrpc: Some("2.0".into()),
            method: Some(method.into()),
            id: Some(id),
            params,
        }
    }

    fn notification(method: &str) -> Envelope {
        Envelope {
            jsonrpc: Some("2.0".into()),
            method: Some(method.into()),
            id: None,
            params: None,
        }
    }

    // ── initialize ───────────────────────────────────────────────────

    #[tokio::test]
    async fn initialize_allocates_session_and_echoes_id() {
        let (dispatcher, sessions) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(
                request(json!(1), "initialize", Some(json!({"protocolVersion": "2024-11-05"}))),
                None,
            )
            .await;

        let resp = outcome.response.expect("requests get exactly one response");
        assert_eq!(resp.id, json!(1));
        assert!(!resp.is_error());

        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "CampusGate");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);

        let sid = outcome.session_id.expect("session id for the transport header");
        assert!(sessions.contains(&sid));
    }

    #[tokio::test]
    async fn initialize_with_string_id_echoes_it_verbatim() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(request(json!("init-9"), "initialize", None), None)
            .await;
        assert_eq!(outcome.response.unwrap().id, json!("init-9"));
    }

    #[tokio::test]
    async fn initialize_without_params_still_succeeds() {
        let (dispatcher, sessions) = default_dispatcher();
        let outcome = dispatcher.dispatch(request(json!(2), "initialize", None), None).await;
        assert!(!outcome.response.unwrap().is_error());
        assert_eq!(sessions.len(), 1);
    }

    // ── notifications ────────────────────────────────────────────────

    #[tokio::test]
    async fn notifications_never_produce_a_response() {
        let (dispatcher, _) = default_dispatcher();
        for method in [
            "notifications/initialized",
            "notifications/progress",
            "initialize",
            "tools/list",
            "tools/call",
            "no/such/method",
        ] {
            let outcome = dispatcher.dispatch(notification(method), None).await;
            assert!(outcome.response.is_none(), "{method} notification must stay silent");
            assert!(outcome.session_id.is_none());
        }
    }

    #[tokio::test]
    async fn notification_class_method_with_id_still_gets_no_response() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(request(json!(5), "notifications/initialized", None), None)
            .await;
        assert!(outcome.response.is_none());
    }

    // ── tools/list ───────────────────────────────────────────────────

    #[tokio::test]
    async fn tools_list_returns_registered_names() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher.dispatch(request(json!(3), "tools/list", None), None).await;
        let resp = outcome.response.unwrap();
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["broken", "echo", "greet"]);
    }

    #[tokio::test]
    async fn tools_list_with_known_session_header_succeeds() {
        let (dispatcher, sessions) = default_dispatcher();
        let session = sessions.create("2024-11-05".into(), json!({}), json!({}));
        let outcome = dispatcher
            .dispatch(request(json!(4), "tools/list", None), Some(&session.session_id))
            .await;
        assert!(!outcome.response.unwrap().is_error());
    }

    #[tokio::test]
    async fn tools_list_with_unknown_session_header_is_invalid_session() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(request(json!(4), "tools/list", None), Some("not-a-session"))
            .await;
        let resp = outcome.response.unwrap();
        let error = resp.error.unwrap();
        assert_eq!(error.code, INVALID_REQUEST);
        assert!(error.message.contains("invalid session"));
    }

    // ── tools/call ───────────────────────────────────────────────────

    #[tokio::test]
    async fn tools_call_unknown_name_is_tool_not_found() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(
                request(json!(5), "tools/call", Some(json!({"name": "missing"}))),
                None,
            )
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert!(error.message.contains("tool not found"));
    }

    #[tokio::test]
    async fn tools_call_string_result_passes_through() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(
                request(json!(6), "tools/call", Some(json!({"name": "greet"}))),
                None,
            )
            .await;
        let resp = outcome.response.unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "hello there");
    }

    #[tokio::test]
    async fn tools_call_structured_result_is_canonical_json() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(
                request(
                    json!(7),
                    "tools/call",
                    Some(json!({"name": "echo", "arguments": {"k": 1}})),
                ),
                None,
            )
            .await;
        let resp = outcome.response.unwrap();
        let text = resp.result.unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_owned();
        let round_trip: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(round_trip, json!({"k": 1}));
    }

    #[tokio::test]
    async fn tools_call_failure_becomes_internal_error() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(
                request(json!(8), "tools/call", Some(json!({"name": "broken"}))),
                None,
            )
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.message.contains("downstream exploded"));
    }

    #[tokio::test]
    async fn auth_required_tool_is_gated_without_invoking_the_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (dispatcher, _) = dispatcher_with(
            ToolRegistry::new().register(Arc::new(GuardedTool { calls: calls.clone() })),
        );

        let outcome = dispatcher
            .dispatch(
                request(json!(9), "tools/call", Some(json!({"name": "guarded"}))),
                None,
            )
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert!(error.message.contains("requires a live jAccount session"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "tool body must not run");
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(request(json!(10), "tools/call", Some(json!({}))), None)
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
    }

    // ── routing edges ────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_request_method_is_method_not_found() {
        let (dispatcher, _) = default_dispatcher();
        let outcome = dispatcher
            .dispatch(request(json!(11), "resources/list", None), None)
            .await;
        let error = outcome.response.unwrap().error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert!(error.message.contains("resources/list"));
    }

    #[tokio::test]
    async fn missing_method_on_a_request_is_invalid_request() {
        let (dispatcher, _) = default_dispatcher();
        let envelope = Envelope {
            jsonrpc: Some("2.0".into()),
            method: None,
            id: Some(json!(12)),
            params: None,
        };
        let outcome = dispatcher.dispatch(envelope, None).await;
        assert_eq!(outcome.response.unwrap().error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn scenario_initialize_then_list_with_returned_session() {
        let (dispatcher, _) = default_dispatcher();
        let init = dispatcher
            .dispatch(
                request(json!(1), "initialize", Some(json!({"protocolVersion": "2024-11-05"}))),
                None,
            )
            .await;
        let sid = init.session_id.unwrap();

        let list = dispatcher
            .dispatch(request(json!(2), "tools/list", None), Some(&sid))
            .await;
        let resp = list.response.unwrap();
        assert!(!resp.is_error());
        let names: Vec<&str> = resp.result.as_ref().unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["broken", "echo", "greet"]);
    }
}
