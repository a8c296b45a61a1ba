mod common;

use common::{expect_ok, n, request, spawn_sidecar, t, temp_dir, write_xlsx};
use serde_json::json;

#[test]
fn history_keeps_only_the_twenty_most_recent_uploads() {
    let workspace = temp_dir("classperf-history-cap");
    let xlsx = workspace.join("marks.xlsx");
    write_xlsx(
        &xlsx,
        &[(
            "Sheet1",
            vec![vec![t("Name"), t("Math")], vec![t("Asha"), n(85.0)]],
        )],
    );

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        ),
        "workspace.select",
    );

    let mut ids: Vec<String> = Vec::new();
    for i in 0..21 {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("u{}", i),
            "uploads.ingest",
            json!({
                "filePath": xlsx.to_string_lossy(),
                "teacher": "T",
                "className": "8D",
                "subject": "Math",
                "examName": format!("Test {}", i)
            }),
        );
        let result = expect_ok(&resp, "uploads.ingest");
        ids.push(result["uploadId"].as_str().unwrap().to_string());
    }

    let resp = request(&mut stdin, &mut reader, "h", "uploads.history", json!({}));
    let history = expect_ok(&resp, "uploads.history")["history"].clone();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 20);

    // Most recent first; the very first upload was evicted.
    assert_eq!(history[0]["id"].as_str(), Some(ids[20].as_str()));
    assert_eq!(history[19]["id"].as_str(), Some(ids[1].as_str()));
    assert!(!history
        .iter()
        .any(|m| m["id"].as_str() == Some(ids[0].as_str())));

    // The evicted payload is gone too, not just its history entry.
    let resp = request(
        &mut stdin,
        &mut reader,
        "g",
        "uploads.get",
        json!({ "uploadId": ids[0] }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_found");

    // Survivors are still readable.
    let resp = request(
        &mut stdin,
        &mut reader,
        "g2",
        "uploads.get",
        json!({ "uploadId": ids[1] }),
    );
    expect_ok(&resp, "uploads.get");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
