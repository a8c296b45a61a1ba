use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::calc;
use crate::ingest::UploadPayload;

/// Where the summary request goes. Defaults target Groq's OpenAI-compatible
/// endpoint; the `setup.summary` section can point anywhere that speaks
/// `chat/completions`. The key itself never touches the database, only the
/// name of the environment variable holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_students: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            max_students: 200,
        }
    }
}

/// Aggregates sent across the AI boundary: per-subject averages and capped
/// per-student totals. Raw subject scores stay local.
pub fn build_request_payload(payload: &UploadPayload, cap: usize) -> serde_json::Value {
    json!({
        "meta": {
            "teacher": payload.meta.teacher,
            "className": payload.meta.class_name,
            "subject": payload.meta.subject,
        },
        "subjects": payload.meta.subjects,
        "averages": calc::subject_averages(payload),
        "perStudent": calc::student_summaries(payload, cap),
    })
}

pub fn build_prompt(payload: &UploadPayload, cap: usize) -> String {
    let averages = calc::subject_averages(payload);
    let per_student = calc::student_summaries(payload, cap);

    format!(
        "You are an analytics assistant for a class performance dashboard. Given JSON of students and averages,\n\
         write a short, helpful, and friendly summary (120-180 words) for a teacher. Highlight:\n\
         - strongest subjects and weakest subjects using averages,\n\
         - notable improvements or declines based on delta,\n\
         - 2-3 actionable suggestions.\n\
         \n\
         JSON:\n\
         subjects: {}\n\
         averages: {}\n\
         students: {}\n\
         context: Teacher={}, Class={}, Subject={}\n",
        serde_json::to_string(&payload.meta.subjects).unwrap_or_default(),
        serde_json::to_string(&averages).unwrap_or_default(),
        serde_json::to_string(&per_student).unwrap_or_default(),
        payload.meta.teacher,
        payload.meta.class_name,
        payload.meta.subject,
    )
}

/// One blocking request/response, no retry, no streaming.
pub fn generate(cfg: &SummaryConfig, payload: &UploadPayload) -> anyhow::Result<String> {
    let api_key = std::env::var(&cfg.api_key_env)
        .map_err(|_| anyhow!("environment variable {} is not set", cfg.api_key_env))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&json!({
            "model": cfg.model,
            "messages": [{ "role": "user", "content": build_prompt(payload, cfg.max_students) }],
        }))
        .send()?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        warn!("summary API error ({}): {}", status, body);
        return Err(anyhow!("API error ({})", status));
    }

    let body: serde_json::Value = resp.json()?;
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| anyhow!("malformed completion response"))?;
    Ok(text.trim().to_string())
}
