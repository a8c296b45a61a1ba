use crate::db;
use crate::ingest::HeaderLexicon;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::summary::SummaryConfig;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Ingest,
    Summary,
    Reports,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "ingest" => Some(Self::Ingest),
            "summary" => Some(Self::Summary),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Ingest => "setup.ingest",
            Self::Summary => "setup.summary",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Ingest => {
            serde_json::to_value(HeaderLexicon::default()).unwrap_or_else(|_| json!({}))
        }
        SetupSection::Summary => {
            serde_json::to_value(SummaryConfig::default()).unwrap_or_else(|_| json!({}))
        }
        SetupSection::Reports => json!({
            "warningsShown": 10
        }),
    }
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut value = default_section(section);
    if let Some(stored) = db::settings_get_json(conn, section.key())? {
        if let (Some(base), Some(over)) = (value.as_object_mut(), stored.as_object()) {
            for (k, v) in over {
                base.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(value)
}

fn string_list(v: &Value) -> Option<Vec<String>> {
    v.as_array()?
        .iter()
        .map(|x| x.as_str().map(|s| s.to_string()))
        .collect()
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let Some(obj) = current.as_object_mut() else {
        return Err("section is not an object".to_string());
    };

    for (key, value) in patch {
        let valid = match (section, key.as_str()) {
            (SetupSection::Ingest, "nameHeaders") | (SetupSection::Ingest, "metaHeaders") => {
                match string_list(value) {
                    Some(list) if !list.is_empty() => true,
                    _ => {
                        return Err(format!("{} must be a non-empty list of strings", key));
                    }
                }
            }
            (SetupSection::Summary, "baseUrl")
            | (SetupSection::Summary, "model")
            | (SetupSection::Summary, "apiKeyEnv") => value.as_str().is_some_and(|s| !s.is_empty()),
            (SetupSection::Summary, "maxStudents") => value.as_u64().is_some_and(|n| n > 0),
            (SetupSection::Reports, "warningsShown") => value.as_u64().is_some_and(|n| n > 0),
            _ => return Err(format!("unknown key: {}", key)),
        };
        if !valid {
            return Err(format!("invalid value for {}", key));
        }
        obj.insert(key.clone(), value.clone());
    }

    Ok(())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let ingest = match load_section(conn, SetupSection::Ingest) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let summary = match load_section(conn, SetupSection::Summary) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let reports = match load_section(conn, SetupSection::Reports) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "ingest": ingest,
            "summary": summary,
            "reports": reports
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
