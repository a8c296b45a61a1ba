use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::workbook::format_number;
use serde_json::json;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One row per student, wide format: current score per subject plus totals.
fn handle_exchange_export_class_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let upload_id = match required_str(req, "uploadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let payload = match db::get_upload(conn, &upload_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "upload not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut csv = String::from("student_id,student_name");
    for subject in &payload.meta.subjects {
        csv.push(',');
        csv.push_str(&csv_quote(subject));
    }
    csv.push_str(",total_current,total_previous,delta\n");

    let rows_exported = payload.records.len();
    for r in &payload.records {
        csv.push_str(&csv_quote(&r.id));
        csv.push(',');
        csv.push_str(&csv_quote(&r.name));
        for subject in &payload.meta.subjects {
            csv.push(',');
            if let Some(v) = r.scores.get(subject).and_then(|s| s.current) {
                csv.push_str(&format_number(v));
            }
        }
        csv.push(',');
        csv.push_str(&format_number(r.total_current));
        csv.push(',');
        if let Some(v) = r.total_previous {
            csv.push_str(&format_number(v));
        }
        csv.push(',');
        if let Some(v) = r.delta {
            csv.push_str(&format_number(v));
        }
        csv.push('\n');
    }

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, csv) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }

    ok(
        &req.id,
        json!({ "ok": true, "rowsExported": rows_exported, "path": out_path }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportClassCsv" => Some(handle_exchange_export_class_csv(state, req)),
        _ => None,
    }
}
