use crate::db;
use crate::ingest::{self, ExamOptions, HeaderLexicon, IngestError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::workbook;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::info;

pub fn load_lexicon(conn: &rusqlite::Connection) -> HeaderLexicon {
    db::settings_get_json(conn, "setup.ingest")
        .ok()
        .flatten()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn validate_options(opts: &ExamOptions) -> Result<(), String> {
    if opts.teacher.trim().is_empty()
        || opts.class_name.trim().is_empty()
        || opts.subject.trim().is_empty()
    {
        return Err("teacher, className and subject must not be empty".to_string());
    }

    if let (Some(total), Some(passing)) = (opts.total_marks, opts.passing_marks) {
        if total > 0 && passing > 0 && passing > total {
            return Err("Passing marks cannot be greater than total marks".to_string());
        }
    }

    if let Some(date) = &opts.exam_date {
        let ok = chrono::DateTime::parse_from_rfc3339(date).is_ok()
            || chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok();
        if !ok {
            return Err(format!("examDate is not an ISO-8601 date: {}", date));
        }
    }

    Ok(())
}

fn handle_uploads_ingest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let file_path = match required_str(req, "filePath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    let mut opts: ExamOptions = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if let Err(msg) = validate_options(&opts) {
        return err(&req.id, "bad_params", msg, None);
    }

    let bytes = match std::fs::read(&file_path) {
        Ok(b) => b,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": file_path.to_string_lossy() })),
            )
        }
    };
    opts.file_digest = Some(hex::encode(Sha256::digest(&bytes)));
    if opts.file_name.is_none() {
        opts.file_name = file_path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string());
    }

    let wb = match workbook::decode(&bytes) {
        Ok(w) => w,
        Err(e) => {
            return err(
                &req.id,
                "workbook_decode_failed",
                e.to_string(),
                Some(json!({ "path": file_path.to_string_lossy() })),
            )
        }
    };

    let lexicon = load_lexicon(conn);
    let payload = match ingest::ingest(&wb, &opts, &lexicon) {
        Ok(p) => p,
        Err(e @ IngestError::NoData) => return err(&req.id, "no_data", e.to_string(), None),
        Err(e @ IngestError::NoNameColumn) => {
            return err(&req.id, "missing_name_column", e.to_string(), None)
        }
    };

    info!(
        "ingested {} students ({} warnings) from {}",
        payload.meta.student_count,
        payload.meta.warnings.len(),
        file_path.to_string_lossy()
    );

    if let Err(e) = db::save_upload(conn, &payload) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "uploadId": payload.meta.id.clone(), "meta": payload.meta }),
    )
}

fn handle_uploads_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "history": [] }));
    };
    match db::history(conn) {
        Ok(history) => ok(&req.id, json!({ "history": history })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_uploads_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let upload_id = match required_str(req, "uploadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match db::get_upload(conn, &upload_id) {
        Ok(Some(payload)) => ok(&req.id, json!({ "payload": payload })),
        Ok(None) => err(&req.id, "not_found", "upload not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_uploads_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let upload_id = match required_str(req, "uploadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match db::delete_upload(conn, &upload_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "upload not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "uploads.ingest" => Some(handle_uploads_ingest(state, req)),
        "uploads.history" => Some(handle_uploads_history(state, req)),
        "uploads.get" => Some(handle_uploads_get(state, req)),
        "uploads.delete" => Some(handle_uploads_delete(state, req)),
        _ => None,
    }
}
