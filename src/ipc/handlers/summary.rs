use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::summary::{self, SummaryConfig};
use serde_json::json;
use tracing::warn;

pub fn load_summary_config(conn: &rusqlite::Connection) -> SummaryConfig {
    db::settings_get_json(conn, "setup.summary")
        .ok()
        .flatten()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn fetch_payload(
    state: &AppState,
    req: &Request,
) -> Result<(crate::ingest::UploadPayload, SummaryConfig), serde_json::Value> {
    let conn = db_conn(state, req)?;
    let upload_id = required_str(req, "uploadId")?;
    match db::get_upload(conn, &upload_id) {
        Ok(Some(p)) => Ok((p, load_summary_config(conn))),
        Ok(None) => Err(err(&req.id, "not_found", "upload not found", None)),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

/// The exact aggregates and prompt `summary.generate` would send, without
/// sending them. Lets the UI show "what leaves this machine" before the user
/// opts in.
fn handle_summary_payload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (payload, cfg) = match fetch_payload(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    ok(
        &req.id,
        json!({
            "payload": summary::build_request_payload(&payload, cfg.max_students),
            "prompt": summary::build_prompt(&payload, cfg.max_students),
            "model": cfg.model,
        }),
    )
}

fn handle_summary_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (payload, cfg) = match fetch_payload(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match summary::generate(&cfg, &payload) {
        Ok(text) => ok(&req.id, json!({ "summary": text })),
        Err(e) => {
            // The UI shows one generic line; the cause goes to the log.
            warn!("summary generation failed: {e:?}");
            err(&req.id, "summary_failed", "failed to generate summary", None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "summary.payload" => Some(handle_summary_payload(state, req)),
        "summary.generate" => Some(handle_summary_generate(state, req)),
        _ => None,
    }
}
