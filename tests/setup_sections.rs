mod common;

use common::{expect_ok, n, request, spawn_sidecar, t, temp_dir, write_xlsx};
use serde_json::json;

#[test]
fn setup_defaults_update_and_validation() {
    let workspace = temp_dir("classperf-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // No workspace yet.
    let resp = request(&mut stdin, &mut reader, "0", "setup.get", json!({}));
    assert_eq!(resp["error"]["code"], "no_workspace");

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

    let resp = request(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    let sections = expect_ok(&resp, "setup.get").clone();
    assert_eq!(sections["ingest"]["nameHeaders"][0], "name");
    assert_eq!(sections["summary"]["apiKeyEnv"], "GROQ_API_KEY");
    assert_eq!(sections["reports"]["warningsShown"], 10);

    // Patches merge over defaults and persist.
    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "3",
            "setup.update",
            json!({ "section": "summary", "patch": { "maxStudents": 50 } }),
        ),
        "setup.update",
    );
    let resp = request(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    let sections = expect_ok(&resp, "setup.get").clone();
    assert_eq!(sections["summary"]["maxStudents"], 50);
    assert_eq!(sections["summary"]["model"], "llama-3.1-8b-instant");

    // Unknown keys and malformed values are rejected.
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "summary", "patch": { "nope": 1 } }),
    );
    assert_eq!(resp["error"]["code"], "bad_params");

    let resp = request(
        &mut stdin,
        &mut reader,
        "6",
        "setup.update",
        json!({ "section": "ingest", "patch": { "nameHeaders": [] } }),
    );
    assert_eq!(resp["error"]["code"], "bad_params");

    let resp = request(
        &mut stdin,
        &mut reader,
        "7",
        "setup.update",
        json!({ "section": "nope", "patch": {} }),
    );
    assert_eq!(resp["error"]["code"], "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn custom_header_lexicon_applies_to_ingestion() {
    let workspace = temp_dir("classperf-setup-lexicon");
    let xlsx = workspace.join("marathi.xlsx");
    write_xlsx(
        &xlsx,
        &[(
            "Sheet1",
            vec![
                vec![t("Kramank"), t("Vidyarthi"), t("Ganit")],
                vec![n(1.0), t("Asha"), n(85.0)],
            ],
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

    // With the default lexicon this file has no recognizable name column.
    let params = json!({
        "filePath": xlsx.to_string_lossy(),
        "teacher": "T",
        "className": "8D",
        "subject": "Ganit"
    });
    let resp = request(&mut stdin, &mut reader, "2", "uploads.ingest", params.clone());
    assert_eq!(resp["error"]["code"], "missing_name_column");

    expect_ok(
        &request(
            &mut stdin,
            &mut reader,
            "3",
            "setup.update",
            json!({
                "section": "ingest",
                "patch": {
                    "nameHeaders": ["vidyarthi"],
                    "metaHeaders": ["kramank"]
                }
            }),
        ),
        "setup.update",
    );

    let resp = request(&mut stdin, &mut reader, "4", "uploads.ingest", params);
    let result = expect_ok(&resp, "uploads.ingest");
    assert_eq!(result["meta"]["subjects"], json!(["Ganit"]));
    assert_eq!(result["meta"]["studentCount"], 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
