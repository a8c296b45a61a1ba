use crate::calc;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::workbook::format_number;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ReportConfig {
    warnings_shown: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { warnings_shown: 10 }
    }
}

fn load_report_config(conn: &rusqlite::Connection) -> ReportConfig {
    db::settings_get_json(conn, "setup.reports")
        .ok()
        .flatten()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn fmt_score(v: Option<f64>) -> String {
    v.map(format_number).unwrap_or_else(|| "-".to_string())
}

fn fmt_delta(v: Option<f64>) -> String {
    match v {
        Some(d) if d > 0.0 => format!("+{}", format_number(d)),
        Some(d) => format_number(d),
        None => "-".to_string(),
    }
}

/// Render-ready model for the dashboard table and the PDF exporter. The
/// renderers only format and draw; every derived value is computed here.
fn handle_class_report_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let upload_id = match required_str(req, "uploadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let payload = match db::get_upload(conn, &upload_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "upload not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let cfg = load_report_config(conn);
    let meta = &payload.meta;

    let mut columns: Vec<String> = Vec::with_capacity(meta.subjects.len() + 3);
    columns.push("Student".to_string());
    columns.extend(meta.subjects.iter().cloned());
    columns.push("Total".to_string());
    columns.push("Δ".to_string());

    let rows: Vec<serde_json::Value> = payload
        .records
        .iter()
        .map(|r| {
            let cells: Vec<String> = meta
                .subjects
                .iter()
                .map(|s| {
                    let Some(sc) = r.scores.get(s) else {
                        return "-".to_string();
                    };
                    match sc.previous {
                        Some(prev) => {
                            format!("{} ({})", fmt_score(sc.current), format_number(prev))
                        }
                        None => fmt_score(sc.current),
                    }
                })
                .collect();

            let progress = r.total_previous.map(|prev| {
                let max = r.total_current.max(prev).max(1.0);
                let pct = ((100.0 * r.total_current / max).round() as i64).min(100);
                let delta = r.delta.unwrap_or(0.0);
                let trend = if delta > 0.0 {
                    "up"
                } else if delta < 0.0 {
                    "down"
                } else {
                    "flat"
                };
                json!({ "pct": pct, "trend": trend })
            });

            json!({
                "id": r.id,
                "name": r.name,
                "cells": cells,
                "total": r.total_current,
                "delta": fmt_delta(r.delta),
                "progress": progress,
            })
        })
        .collect();

    let averages = calc::subject_averages(&payload);
    let pass_stats = calc::pass_stats(&payload);

    let warnings_shown: Vec<&String> =
        meta.warnings.iter().take(cfg.warnings_shown).collect();

    let subtitle = format!(
        "Teacher: {} • Class: {} • Subject: {} • Date: {}",
        meta.teacher, meta.class_name, meta.subject, meta.created_at
    );

    ok(
        &req.id,
        json!({
            "title": "Class Performance Report",
            "subtitle": subtitle,
            "columns": columns,
            "rows": rows,
            "averages": averages,
            "passStats": pass_stats,
            "studentCount": meta.student_count,
            "warnings": warnings_shown,
            "warningsTotal": meta.warnings.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.classReportModel" => Some(handle_class_report_model(state, req)),
        _ => None,
    }
}
