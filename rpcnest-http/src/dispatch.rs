//! axum handlers for the rpcnest endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::future::join_all;
use http::HeaderMap;
use rpcnest_core::{AutoRouter, ProcedureKind, ProcedureMeta, ProcedureOutput, RpcError};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::error::{member_error, timestamp, HttpRpcError};
use crate::input::{
    accepts_event_stream, decode_body, empty_input, parse_query_input, split_procedure,
    unwrap_envelope,
};
use crate::introspect::{group_by_router, list_procedures, RouterIntrospector, StaticProcedureHints};
use crate::sse::{sse_response, SseOptions};

/// State shared by the rpcnest handlers.
#[derive(Clone)]
pub struct RpcHttpState {
    pub service: Arc<AutoRouter>,
    pub introspector: Arc<dyn RouterIntrospector>,
    pub hints: Arc<StaticProcedureHints>,
    pub sse: SseOptions,
    pub prefix: String,
}

impl RpcHttpState {
    /// Resolve and call `router.procedure`.
    pub async fn call(&self, path: &str, input: Value) -> Result<ProcedureOutput, RpcError> {
        let (router, procedure) = split_procedure(path)?;
        debug!(router, procedure, "Dispatching procedure call");
        let result = self.service.call_procedure(router, procedure, input).await;
        if let Err(e) = &result {
            error!(router, procedure, error = %e, "Procedure call failed");
        }
        result
    }

    fn meta(&self, path: &str) -> Option<ProcedureMeta> {
        let (router, procedure) = split_procedure(path).ok()?;
        self.service.procedure_meta(router, procedure)
    }

    fn is_subscription(&self, path: &str) -> bool {
        self.meta(path)
            .is_some_and(|meta| meta.kind == ProcedureKind::Subscription)
    }

    /// Subscriptions are always streamed since they may never complete.
    fn wants_sse(&self, path: &str, headers: &HeaderMap) -> bool {
        if accepts_event_stream(headers) {
            return true;
        }
        self.meta(path).is_some_and(|meta| {
            meta.server_sent_events || meta.kind == ProcedureKind::Subscription
        })
    }

    /// Single call answered as `{procedure, input, result, timestamp}`, or as
    /// an event stream for sequences when the client or the procedure asks.
    async fn respond_single(&self, path: &str, input: Value, headers: &HeaderMap) -> Response {
        let output = match self.call(path, input.clone()).await {
            Ok(output) => output,
            Err(e) => return HttpRpcError::from_rpc(&e).with("procedure", path).into_response(),
        };
        if !output.is_single() && self.wants_sse(path, headers) {
            return sse_response(output.into_stream(), self.sse.clone());
        }
        match output.collect().await {
            Ok(result) => Json(json!({
                "procedure": path,
                "input": input,
                "result": result,
                "timestamp": timestamp(),
            }))
            .into_response(),
            Err(e) => {
                error!(procedure = path, error = %e, "Procedure stream failed");
                HttpRpcError::from_rpc(&e).with("procedure", path).into_response()
            }
        }
    }

    /// One batch slot: `{result, timestamp}` or `{error: {message, code}}`.
    /// Subscriptions are refused: their stream cannot be collected into a slot.
    async fn batch_member(&self, path: &str, input: Value) -> Value {
        if self.is_subscription(path) {
            return member_error(&RpcError::InvalidInput(format!(
                "subscription '{path}' cannot run in a batch, call it alone as an event stream"
            )));
        }
        let result = match self.call(path, input).await {
            Ok(output) => output.collect().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(result) => json!({ "result": result, "timestamp": timestamp() }),
            Err(e) => member_error(&e),
        }
    }

    /// Run every operation concurrently. Slots keep the order of `ops`.
    async fn run_batch(&self, ops: Vec<(String, Result<(String, Value), RpcError>)>) -> Value {
        let futures = ops.into_iter().map(|(key, op)| async move {
            let slot = match op {
                Ok((path, input)) => self.batch_member(&path, input).await,
                Err(e) => member_error(&e),
            };
            (key, slot)
        });
        let mut results = Map::new();
        for (key, slot) in join_all(futures).await {
            results.insert(key, slot);
        }
        Value::Object(results)
    }
}

/// `POST {prefix}/{procedure}`
pub async fn post_single(
    State(state): State<RpcHttpState>,
    Path(procedure): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input = match decode_body(&headers, &body) {
        Ok(input) => input,
        Err(e) => return HttpRpcError::from_rpc(&e).with("procedure", procedure).into_response(),
    };
    state.respond_single(&procedure, input, &headers).await
}

/// `GET {prefix}/{procedure}?input=...` and
/// `GET {prefix}/{a},{b}?batch=1&input={"0":...,"1":...}`
pub async fn get_call(
    State(state): State<RpcHttpState>,
    Path(procedure): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let params: HashMap<String, String> =
        form_urlencoded::parse(query.as_deref().unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    let raw_input = params.get("input").map(String::as_str);

    if params.get("batch").map(String::as_str) == Some("1") {
        let procedures: Vec<String> = procedure
            .split(',')
            .map(|p| p.trim().to_string())
            .collect();
        let inputs = match parse_query_input(raw_input) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return HttpRpcError::bad_request("batch input must be an object keyed by index")
                    .with("procedures", procedures)
                    .into_response()
            }
            Err(e) => {
                return HttpRpcError::from_rpc(&e)
                    .with("procedures", procedures)
                    .into_response()
            }
        };

        debug!(count = procedures.len(), "Dispatching GET batch");
        let ops = procedures
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                let key = index.to_string();
                let input = inputs
                    .get(&key)
                    .cloned()
                    .map(unwrap_envelope)
                    .unwrap_or_else(empty_input);
                (key, Ok((path, input)))
            })
            .collect();
        return Json(state.run_batch(ops).await).into_response();
    }

    match parse_query_input(raw_input) {
        Ok(input) => state.respond_single(&procedure, input, &headers).await,
        Err(e) => HttpRpcError::from_rpc(&e).with("procedure", procedure).into_response(),
    }
}

/// `POST {prefix}` with `{"<id>": {"procedure": "...", "input": ...}, ...}`.
/// Duplicate ids keep the last operation.
pub async fn post_batch(State(state): State<RpcHttpState>, body: Bytes) -> Response {
    let ops = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(ops)) => ops,
        Ok(_) => {
            return HttpRpcError::bad_request(
                "batch body must be an object of {procedure, input} operations",
            )
            .into_response()
        }
        Err(e) => {
            return HttpRpcError::bad_request(format!("invalid JSON body: {e}")).into_response()
        }
    };

    debug!(count = ops.len(), "Dispatching POST batch");
    let ops = ops
        .into_iter()
        .map(|(key, op)| {
            let parsed = match op.get("procedure").and_then(Value::as_str) {
                Some(path) => {
                    let input = op.get("input").cloned().unwrap_or_else(empty_input);
                    Ok((path.to_string(), input))
                }
                None => Err(RpcError::InvalidInput(format!(
                    "operation '{key}' needs a string 'procedure' field"
                ))),
            };
            (key, parsed)
        })
        .collect();
    Json(state.run_batch(ops).await).into_response()
}

/// `GET {prefix}`
pub async fn info(State(state): State<RpcHttpState>) -> Json<Value> {
    let (procedures, source) =
        list_procedures(&state.service, state.introspector.as_ref(), &state.hints);
    let by_router = group_by_router(&procedures);
    let total = procedures.len();
    let prefix = state.prefix.trim_end_matches('/');
    let example = procedures.first().cloned().unwrap_or_else(|| "router.procedure".into());

    Json(json!({
        "message": "rpcnest HTTP endpoints",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "single": format!("POST {prefix}/{{router.procedure}}"),
            "query": format!("GET {prefix}/{{router.procedure}}?input={{json}}"),
            "getBatch": format!("GET {prefix}/{{a}},{{b}}?batch=1&input={{\"0\":...,\"1\":...}}"),
            "postBatch": format!("POST {prefix}"),
            "info": format!("GET {prefix}"),
        },
        "registeredControllers": state.service.registered_controllers(),
        "availableProcedures": procedures,
        "routerInfo": {
            "totalProcedures": total,
            "introspection": source.as_str(),
            "proceduresByRouter": by_router,
        },
        "batchExamples": {
            "post": {
                "0": { "procedure": example.clone(), "input": {} },
            },
            "get": format!("{prefix}/{example}?batch=1&input={{\"0\":{{\"json\":{{}}}}}}"),
        },
    }))
}
