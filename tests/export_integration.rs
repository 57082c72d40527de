// ABOUTME: End-to-end export tests against a mocked Airtable API
// ABOUTME: Covers default format, schema discovery, round trips, SQLite upserts, batching, and failures

use airtable_export::api::ApiClient;
use airtable_export::encode::Formats;
use airtable_export::export::{export_base, ExportOptions, TableSummary};
use airtable_export::{Record, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Distinct creation time per record, derived from the id's numeric suffix.
fn created_time(id: &str) -> String {
    let n: u32 = id.trim_start_matches("rec").parse().unwrap_or(0);
    format!("2024-02-01T08:{:02}:{:02}.000Z", n / 60, n % 60)
}

fn record(id: &str, fields: Value) -> Value {
    json!({
        "id": id,
        "createdTime": created_time(id),
        "fields": fields
    })
}

/// Every exported row carries its own source record's id and creation time.
fn assert_reserved_keys(records: &[Record]) {
    for record in records {
        let id = record["airtable_id"].as_str().unwrap();
        assert_eq!(record["airtable_createdTime"], created_time(id).as_str(), "{}", id);
    }
}

async fn mount_table(server: &MockServer, table_path: &str, pages: Vec<Vec<Value>>) {
    let count = pages.len();
    for (i, records) in pages.into_iter().enumerate() {
        let mut body = json!({ "records": records });
        if i + 1 < count {
            body["offset"] = json!(format!("itr{}", i + 1));
        }
        let mock = Mock::given(method("GET")).and(path(table_path));
        let mock = if i == 0 {
            mock.and(query_param_is_missing("offset"))
        } else {
            mock.and(query_param("offset", format!("itr{}", i)))
        };
        mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

async fn run_export(uri: String, opts: ExportOptions) -> Result<Vec<TableSummary>> {
    tokio::task::spawn_blocking(move || {
        let client = ApiClient::new("test_key".into(), Some(uri), None)?.disable_throttle();
        export_base(&client, &opts)
    })
    .await
    .unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn options(dir: &Path, tables: &[&str]) -> ExportOptions {
    ExportOptions {
        output_dir: dir.to_path_buf(),
        base_id: "appTEST".into(),
        tables: tables.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_default_format_is_yaml_only() {
    let server = MockServer::start().await;
    mount_table(
        &server,
        "/v0/appTEST/Tasks",
        vec![vec![
            record("rec1", json!({"Name": "Write docs"})),
            record("rec2", json!({"Name": "Ship"})),
        ]],
    )
    .await;

    let temp = TempDir::new().unwrap();
    let summaries = run_export(server.uri(), options(temp.path(), &["Tasks"]))
        .await
        .unwrap();

    assert_eq!(file_names(temp.path()), vec!["Tasks.yml"]);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].records, 2);

    let yaml = fs::read_to_string(temp.path().join("Tasks.yml")).unwrap();
    let decoded: Vec<Record> = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(decoded[0]["airtable_id"], "rec1");
    assert_eq!(decoded[1]["Name"], "Ship");
    assert_reserved_keys(&decoded);
}

#[tokio::test]
async fn test_schema_discovery_exports_every_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appTEST/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [
                {"id": "tbl1", "name": "Projects", "fields": []},
                {"id": "tbl2", "name": "Projects/2024", "fields": []}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_table(&server, "/v0/appTEST/Projects", vec![vec![record("rec1", json!({}))]]).await;
    mount_table(
        &server,
        "/v0/appTEST/Projects%2F2024",
        vec![vec![record("rec2", json!({"Year": 2024}))]],
    )
    .await;

    let temp = TempDir::new().unwrap();
    let out = temp.path().join("nested").join("out");
    let mut opts = options(&out, &[]);
    opts.formats = Formats {
        json: true,
        ..Default::default()
    };
    let summaries = run_export(server.uri(), opts).await.unwrap();

    let tables: Vec<&str> = summaries.iter().map(|s| s.table.as_str()).collect();
    assert_eq!(tables, vec!["Projects", "Projects/2024"]);

    let schema: Value =
        serde_json::from_str(&fs::read_to_string(out.join("_schema.json")).unwrap()).unwrap();
    assert_eq!(schema["tables"][1]["name"], "Projects/2024");
    assert!(out.join("Projects.json").exists());
    assert!(out.join("Projects_2024.json").exists());
}

#[tokio::test]
async fn test_schema_flag_with_explicit_tables() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/appTEST/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [{"id": "tbl1", "name": "Tasks"}, {"id": "tbl2", "name": "Other"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_table(&server, "/v0/appTEST/Tasks", vec![vec![record("rec1", json!({}))]]).await;

    let temp = TempDir::new().unwrap();
    let mut opts = options(temp.path(), &["Tasks"]);
    opts.schema = true;
    let summaries = run_export(server.uri(), opts).await.unwrap();

    // Only the named table is exported
    assert_eq!(summaries.len(), 1);
    assert_eq!(file_names(temp.path()), vec!["Tasks.yml", "_schema.json"]);
}

#[tokio::test]
async fn test_json_and_ndjson_match_fetched_records() {
    let server = MockServer::start().await;
    mount_table(
        &server,
        "/v0/appTEST/Tasks",
        vec![
            vec![
                record("rec1", json!({"Name": "a", "Tags": ["x"]})),
                record("rec2", json!({"Name": "b"})),
            ],
            vec![
                record("rec3", json!({"Name": "c", "Done": true})),
                record("rec4", json!({"Name": "d", "Points": 2.5})),
            ],
            vec![record("rec5", json!({"Name": "e\nmultiline"}))],
        ],
    )
    .await;

    let temp = TempDir::new().unwrap();
    let mut opts = options(temp.path(), &["Tasks"]);
    opts.formats = Formats {
        json: true,
        ndjson: true,
        ..Default::default()
    };
    let summaries = run_export(server.uri(), opts).await.unwrap();
    assert_eq!(summaries[0].records, 5);
    assert_eq!(
        summaries[0].files,
        vec![temp.path().join("Tasks.json"), temp.path().join("Tasks.ndjson")]
    );

    let from_json: Vec<Record> =
        serde_json::from_str(&fs::read_to_string(temp.path().join("Tasks.json")).unwrap())
            .unwrap();
    let from_ndjson: Vec<Record> = fs::read_to_string(temp.path().join("Tasks.ndjson"))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(from_json.len(), 5);
    assert_eq!(from_json, from_ndjson);

    let ids: Vec<&str> = from_ndjson
        .iter()
        .map(|r| r["airtable_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["rec1", "rec2", "rec3", "rec4", "rec5"]);
    assert_eq!(from_ndjson[0]["airtable_createdTime"], "2024-02-01T08:00:01.000Z");
    assert_eq!(from_ndjson[4]["airtable_createdTime"], "2024-02-01T08:00:05.000Z");
    assert_reserved_keys(&from_json);
    assert_reserved_keys(&from_ndjson);
    assert_eq!(from_ndjson[2]["Done"], true);
}

#[tokio::test]
async fn test_sqlite_export_twice_keeps_one_row_per_id() {
    let server = MockServer::start().await;
    mount_table(
        &server,
        "/v0/appTEST/Tasks",
        vec![vec![
            record("rec1", json!({"Name": "a"})),
            record("rec2", json!({"Name": "b", "Points": 3})),
        ]],
    )
    .await;

    let temp = TempDir::new().unwrap();
    let db_path: PathBuf = temp.path().join("export.db");
    let out = temp.path().join("files");

    for _ in 0..2 {
        let mut opts = options(&out, &["Tasks"]);
        opts.sqlite = Some(db_path.clone());
        run_export(server.uri(), opts).await.unwrap();
    }

    // Database sink alone does not trigger the YAML default
    assert!(file_names(&out).is_empty());

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM Tasks", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
    let points: i64 = conn
        .query_row("SELECT Points FROM Tasks WHERE airtable_id = 'rec2'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(points, 3);
}

#[tokio::test]
async fn test_csv_with_zero_records_writes_no_file() {
    let server = MockServer::start().await;
    mount_table(&server, "/v0/appTEST/Empty", vec![vec![]]).await;

    let temp = TempDir::new().unwrap();
    let mut opts = options(temp.path(), &["Empty"]);
    opts.formats = Formats {
        csv: true,
        ..Default::default()
    };
    let summaries = run_export(server.uri(), opts).await.unwrap();

    assert_eq!(summaries[0].records, 0);
    assert!(summaries[0].files.is_empty());
    assert!(file_names(temp.path()).is_empty());
}

#[tokio::test]
async fn test_csv_bulk_file_has_one_header() {
    let server = MockServer::start().await;
    mount_table(
        &server,
        "/v0/appTEST/Tasks",
        vec![vec![
            record("rec1", json!({"Name": "a"})),
            record("rec2", json!({"Name": "b"})),
        ]],
    )
    .await;

    let temp = TempDir::new().unwrap();
    let mut opts = options(temp.path(), &["Tasks"]);
    opts.formats = Formats {
        csv: true,
        ..Default::default()
    };
    run_export(server.uri(), opts).await.unwrap();

    let text = fs::read_to_string(temp.path().join("Tasks.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "Name,airtable_createdTime,airtable_id");
    assert_eq!(lines[1], format!("a,{},rec1", created_time("rec1")));
    assert_eq!(lines[2], format!("b,{},rec2", created_time("rec2")));
}

#[tokio::test]
async fn test_csv_rerun_with_empty_table_removes_stale_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/appTEST/Tasks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"records": [record("rec1", json!({"Name": "a"}))]})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appTEST/Tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let csv_only = || {
        let mut opts = options(temp.path(), &["Tasks"]);
        opts.formats = Formats {
            csv: true,
            ..Default::default()
        };
        opts
    };

    run_export(server.uri(), csv_only()).await.unwrap();
    assert!(temp.path().join("Tasks.csv").exists());

    let summaries = run_export(server.uri(), csv_only()).await.unwrap();
    assert_eq!(summaries[0].records, 0);
    assert!(summaries[0].files.is_empty());
    assert!(!temp.path().join("Tasks.csv").exists());
}

#[tokio::test]
async fn test_large_table_crosses_batch_boundaries() {
    let server = MockServer::start().await;
    let ids: Vec<String> = (0..250).map(|i| format!("rec{}", i)).collect();
    let pages: Vec<Vec<Value>> = ids
        .chunks(100)
        .map(|chunk| {
            chunk
                .iter()
                .map(|id| record(id, json!({"Name": format!("task {}", id)})))
                .collect()
        })
        .collect();
    assert_eq!(pages.len(), 3);
    mount_table(&server, "/v0/appTEST/Tasks", pages).await;

    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("export.db");
    let mut opts = options(temp.path(), &["Tasks"]);
    opts.sqlite = Some(db_path.clone());
    opts.formats = Formats {
        csv: true,
        ..Default::default()
    };
    let summaries = run_export(server.uri(), opts).await.unwrap();
    assert_eq!(summaries[0].records, 250);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let mut stmt = conn
        .prepare("SELECT airtable_id, airtable_createdTime FROM Tasks")
        .unwrap();
    let rows: Vec<(String, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(rows.len(), 250);
    for (id, created) in &rows {
        assert_eq!(created, &created_time(id));
    }

    // The bulk file replaces what the incremental sink appended during the fetch
    let mut reader = csv::Reader::from_path(temp.path().join("Tasks.csv")).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, vec!["Name", "airtable_createdTime", "airtable_id"]);
    let csv_rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(csv_rows.len(), 250);
    for (row, id) in csv_rows.iter().zip(&ids) {
        assert_eq!(&row[2], id.as_str());
        assert_eq!(&row[1], created_time(id).as_str());
    }
}

#[tokio::test]
async fn test_fetch_failure_aborts_remaining_tables() {
    let server = MockServer::start().await;
    mount_table(&server, "/v0/appTEST/First", vec![vec![record("rec1", json!({}))]]).await;
    Mock::given(method("GET"))
        .and(path("/v0/appTEST/Broken"))
        .respond_with(ResponseTemplate::new(404).set_body_string("TABLE_NOT_FOUND"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/appTEST/Last"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let result = run_export(server.uri(), options(temp.path(), &["First", "Broken", "Last"])).await;

    match result {
        Err(airtable_export::Error::Api { status, .. }) => assert_eq!(status, 404),
        other => panic!("Expected API error, got {:?}", other),
    }
    assert_eq!(file_names(temp.path()), vec!["First.yml"]);
}
