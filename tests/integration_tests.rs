use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio_postgres::{Client, NoTls};
use tokio_test::{assert_err, assert_ok};

use pgfeed::data_importer::{MemoryStore, PgStore};
use pgfeed::error::PgfeedError;
use pgfeed::pipeline::{ImportState, Orchestrator};
use pgfeed::record_decoder::InputSource;
use pgfeed::schema_deriver::normalize_table_name;
use pgfeed::types::{ColumnType, ImportConfig, InputFormat, TableRef};

/// Scratch directory holding input files for one test
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create input file");
        file.write_all(contents).expect("write input file");
        path
    }
}

fn config_for(path: &PathBuf, schema: &str, format: InputFormat) -> ImportConfig {
    let table = normalize_table_name(path).expect("table name from file");
    ImportConfig::new(TableRef::new(schema, table), format)
}

#[tokio::test]
async fn test_csv_file_import_end_to_end() {
    let fixture = Fixture::new();
    let path = fixture.write(
        "Friends List.csv",
        b"\xEF\xBB\xBFFirst Name,Last Name,Favourite Colour\nAda,Lovelace,\"green, mostly\"\nAlan,Turing,\"multi\nline\"\n",
    );
    let config = config_for(&path, "import", InputFormat::Delimited);
    let destination = config.destination.clone();
    assert_eq!(destination.to_string(), "import.friends_list");

    let source = InputSource::File(path);
    let store = MemoryStore::new();
    let mut orchestrator = Orchestrator::new(config, Vec::new());
    let report = assert_ok!(orchestrator.run(assert_ok!(source.open()), store.clone()).await);

    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected, 0);
    assert_eq!(orchestrator.state(), ImportState::Committed);

    let state = store.state();
    let table = &state.tables["import.friends_list"];
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["first_name", "last_name", "favourite_colour"]);
    assert_eq!(
        table.rows[1],
        vec![
            Some("Alan".to_string()),
            Some("Turing".to_string()),
            Some("multi\nline".to_string())
        ]
    );
}

#[tokio::test]
async fn test_malformed_file_aborts_with_line_number() {
    let fixture = Fixture::new();
    let path = fixture.write("orders.csv", b"id,amount\n1,10\n2,20,oops\n3,30\n");
    let config = config_for(&path, "import", InputFormat::Delimited);

    let store = MemoryStore::new();
    let mut orchestrator = Orchestrator::new(config, Vec::new());
    let err = assert_err!(
        orchestrator
            .run(assert_ok!(InputSource::File(path).open()), store.clone())
            .await
    );

    assert!(matches!(err, PgfeedError::Aborted { line: 3, .. }));
    assert!(err.to_string().contains("2,20,oops"));
    assert!(store.rows(&TableRef::new("import", "orders")).is_empty());
    assert_eq!(store.state().commits, 0);
}

#[tokio::test]
async fn test_ignore_errors_writes_rejects_to_sink() {
    let fixture = Fixture::new();
    let path = fixture.write("orders.csv", b"id,amount\n1,10\n2,20,oops\n3,30\n\n4\n");
    let mut config = config_for(&path, "staging", InputFormat::Delimited);
    config.ignore_errors = true;

    let store = MemoryStore::new();
    let mut orchestrator = Orchestrator::new(config, Vec::new());
    let report = assert_ok!(
        orchestrator
            .run(assert_ok!(InputSource::File(path).open()), store.clone())
            .await
    );

    assert_eq!((report.accepted, report.rejected), (2, 2));
    assert_eq!(
        report.summary(),
        "2 rows imported into staging.orders\n2 rows could not be imported into staging.orders and have been written to stderr"
    );
    assert_eq!(orchestrator.into_diagnostics(), b"2,20,oops\n4\n".to_vec());
    assert!(store.state().schemas.contains("staging"));
}

#[tokio::test]
async fn test_json_lines_file_import() {
    let fixture = Fixture::new();
    let path = fixture.write(
        "click-events.jsonl",
        b"{\"user\": 1, \"path\": \"/\"}\n{\"user\": 2, \"tags\": [\"a\", \"b\"]}\n",
    );
    let mut config = config_for(&path, "import", InputFormat::JsonLines);
    config.json_type = ColumnType::Jsonb;

    let store = MemoryStore::new();
    let mut orchestrator = Orchestrator::new(config, Vec::new());
    let report = assert_ok!(
        orchestrator
            .run(assert_ok!(InputSource::File(path).open()), store.clone())
            .await
    );

    assert_eq!(report.accepted, 2);
    let state = store.state();
    let table = &state.tables["import.click_events"];
    assert_eq!(table.columns.len(), 1);
    assert_eq!(table.columns[0].column_type, ColumnType::Jsonb);
    assert_eq!(table.rows[0], vec![Some("{\"user\": 1, \"path\": \"/\"}".to_string())]);
}

#[tokio::test]
async fn test_missing_input_file_is_an_io_error() {
    let fixture = Fixture::new();
    let source = InputSource::File(fixture.dir.path().join("absent.csv"));
    let err = source.open().err().expect("opening a missing file fails");
    assert!(matches!(err, PgfeedError::Io(_)));
}

/// Connect to the database named by TEST_DATABASE_URL, if any
async fn test_client() -> Result<Option<Client>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        return Ok(None);
    };
    let (client, connection) = tokio_postgres::connect(&url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {}", e);
        }
    });
    Ok(Some(client))
}

#[tokio::test]
async fn test_postgres_copy_round_trip() -> Result<()> {
    let Some(admin) = test_client().await? else {
        eprintln!("Skipping PostgreSQL test: TEST_DATABASE_URL not set");
        return Ok(());
    };
    let Some(loader) = test_client().await? else {
        return Ok(());
    };

    admin
        .batch_execute("DROP SCHEMA IF EXISTS pgfeed_it CASCADE")
        .await?;

    let fixture = Fixture::new();
    let path = fixture.write(
        "people.csv",
        b"Name,Note\nAda,\"tab\there\"\nGrace,back\\slash\nbroken\n",
    );
    let mut config = config_for(&path, "pgfeed_it", InputFormat::Delimited);
    config.ignore_errors = true;

    let mut orchestrator = Orchestrator::new(config, Vec::new());
    let report = orchestrator
        .run(InputSource::File(path).open()?, PgStore::from_client(loader))
        .await?;
    assert_eq!((report.accepted, report.rejected), (2, 1));

    let rows = admin
        .query("SELECT name, note FROM pgfeed_it.people ORDER BY name", &[])
        .await?;
    let values: Vec<(String, String)> = rows.iter().map(|r| (r.get(0), r.get(1))).collect();
    assert_eq!(
        values,
        vec![
            ("Ada".to_string(), "tab\there".to_string()),
            ("Grace".to_string(), "back\\slash".to_string()),
        ]
    );

    admin.batch_execute("DROP SCHEMA pgfeed_it CASCADE").await?;
    Ok(())
}

#[tokio::test]
async fn test_postgres_abort_leaves_no_rows() -> Result<()> {
    let Some(admin) = test_client().await? else {
        eprintln!("Skipping PostgreSQL test: TEST_DATABASE_URL not set");
        return Ok(());
    };
    let Some(loader) = test_client().await? else {
        return Ok(());
    };

    admin
        .batch_execute("DROP SCHEMA IF EXISTS pgfeed_abort CASCADE")
        .await?;

    let fixture = Fixture::new();
    let path = fixture.write("t.csv", b"a,b\n1,2\n3,x,y\n");
    let config = config_for(&path, "pgfeed_abort", InputFormat::Delimited);

    let mut orchestrator = Orchestrator::new(config, Vec::new());
    let err = orchestrator
        .run(InputSource::File(path).open()?, PgStore::from_client(loader))
        .await
        .unwrap_err();
    assert_eq!(err.line(), Some(3));

    // The schema and table were created inside the rolled back transaction
    let row = admin
        .query_one(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = 'pgfeed_abort'",
            &[],
        )
        .await?;
    let count: i64 = row.get(0);
    assert_eq!(count, 0);
    Ok(())
}
