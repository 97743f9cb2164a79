use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

use acars_recorder::{
    config::ListenerConfig,
    database::{Database, MessageStore, ValueCount},
    errors::AcarsRecorderError,
    export::{write_csv_row, ExportOptions},
    filter::{FieldValue, FilterField, MessageFilter, Predicate},
    listener::{Ingested, Listener},
    models::{AcarsMessage, RawAcarsMessage},
    reassembly::ReassemblyStatus,
    statistics::get_statistics,
};

async fn setup_test_db(dir: &Path) -> Result<Database, AcarsRecorderError> {
    Database::open(&dir.join("acars.db"), 4, Duration::from_secs(5)).await
}

fn message(time: f64, label: &str, reg_no: Option<&str>, libacars: bool) -> AcarsMessage {
    AcarsMessage {
        time,
        freq: if time < 50.0 { "131.450" } else { "131.550" }.to_string(),
        level: -20.0,
        error: 0,
        mode: "2".to_string(),
        label: label.to_string(),
        sub_label: None,
        block_id: Some("3".to_string()),
        ack: Some("!".to_string()),
        reg_no: reg_no.map(str::to_string),
        flight_no: Some("NH0012".to_string()),
        msg_no: Some("M01A".to_string()),
        reassembly_status: ReassemblyStatus::Complete,
        text: Some("POSITION REPORT".to_string()),
        libacars: libacars.then(|| r#"{"arinc622":{}}"#.to_string()),
    }
}

async fn insert_fixture(db: &Database) -> Result<(), AcarsRecorderError> {
    db.insert(&message(10.0, "H1", None, false)).await?;
    db.insert(&message(20.0, "H1", Some("N12345"), true)).await?;
    db.insert(&message(30.0, "5Z", Some("N54321"), false)).await?;
    db.insert(&message(60.0, "SA", Some("N12345"), true)).await?;
    db.insert(&message(70.0, "H1", None, false)).await?;
    Ok(())
}

async fn count(db: &Database, filter: &MessageFilter) -> Result<i64, AcarsRecorderError> {
    db.count_where(&filter.compile()).await
}

#[tokio::test]
async fn test_round_trip_unbounded() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;

    for i in 0..120u32 {
        db.insert(&message(f64::from(i), "H1", None, false)).await?;
    }

    let predicate = MessageFilter::time_range(f64::NEG_INFINITY, f64::INFINITY).compile();
    let page = db.query(&predicate, None, 0, 1000).await?;
    assert_eq!(page.total_count, 120);
    assert_eq!(page.rows.len(), 120);

    let mut ids: Vec<i64> = page.rows.iter().map(|r| r.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 120);
    Ok(())
}

#[tokio::test]
async fn test_reg_no_with_null_sentinel() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;
    insert_fixture(&db).await?;

    let mut filter = MessageFilter::time_range(0.0, 100.0);
    filter.reg_no = Some(vec![None, Some("N12345".into())]);

    let rows = db.fetch(&filter.compile(), None, 0, 100).await?;
    let times: Vec<f64> = rows.iter().map(|r| r.message.time).collect();
    assert_eq!(times, vec![10.0, 20.0, 60.0, 70.0]);
    assert!(rows
        .iter()
        .all(|r| matches!(r.message.reg_no.as_deref(), None | Some("N12345"))));

    filter.reg_no = Some(vec![None]);
    assert_eq!(count(&db, &filter).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_value_set_matches_omitted() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;
    insert_fixture(&db).await?;

    let omitted = MessageFilter::time_range(0.0, 100.0);
    for field in FilterField::ALL {
        let mut with_empty = omitted.clone();
        *with_empty.values_mut(field) = Some(Vec::new());
        assert_eq!(count(&db, &with_empty).await?, count(&db, &omitted).await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_combined_filters() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;
    insert_fixture(&db).await?;

    let mut filter = MessageFilter::time_range(15.0, 65.0);
    filter.label = Some(vec![Some("H1".into()), Some("SA".into())]);
    filter.libacars = Some(vec![true]);
    assert_eq!(count(&db, &filter).await?, 2);

    filter.text = Some("position".to_string());
    assert_eq!(count(&db, &filter).await?, 2);

    filter.text = Some("weather".to_string());
    assert_eq!(count(&db, &filter).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_negative_ack_exports_nack() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;

    let raw = RawAcarsMessage::from_datagram(
        br#"{"timestamp": 1718000123.0, "freq": 131.45, "level": -14.2, "error": 0,
             "mode": "2", "label": "H1", "ack": false}"#,
    )?;
    db.insert(&raw.normalize()?).await?;

    let rows = db.fetch(&Predicate::default(), None, 0, 10).await?;
    assert_eq!(rows[0].message.ack, None);

    let mut line = String::new();
    write_csv_row(&mut line, &rows[0].message, &ExportOptions::default());
    assert!(line.contains(",H1,\"\",,\"NACK\","));
    Ok(())
}

#[tokio::test]
async fn test_housekeeping_label_never_stored() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;
    let config = ListenerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        ignored_labels: vec!["_d".to_string(), "Q0".to_string(), "SQ".to_string()],
        max_datagram_size: 4096,
    };
    let listener = Listener::bind(&config, db.clone()).await?;

    let outcome = listener
        .process_datagram(
            br#"{"timestamp": 5.0, "freq": 131.45, "level": -14.2, "error": 0,
                 "mode": "2", "label": "_d"}"#,
        )
        .await?;
    assert_eq!(outcome, Ingested::Ignored);

    let predicate = MessageFilter::time_range(f64::NEG_INFINITY, f64::INFINITY).compile();
    assert_eq!(db.count_where(&predicate).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_statistics_invariants() -> Result<(), AcarsRecorderError> {
    let temp_dir = tempdir()?;
    let db = setup_test_db(temp_dir.path()).await?;
    insert_fixture(&db).await?;

    for (start_s, end_s) in [(0.0, 100.0), (15.0, 65.0), (200.0, 300.0)] {
        let statistics = get_statistics(&db, start_s, end_s).await?;
        let total = db
            .count_where(&Predicate::time_range(start_s, end_s))
            .await?;

        for field in FilterField::ALL {
            let sum: i64 = statistics.fields[&field].iter().map(|c| c.count).sum();
            assert_eq!(sum, total, "{:?} over [{}, {}]", field, start_s, end_s);
        }
        let libacars: i64 = statistics.libacars.iter().map(|c| c.count).sum();
        assert_eq!(libacars, total);
        assert!(statistics.libacars.iter().all(|c| c.count > 0));
    }

    let statistics = get_statistics(&db, 0.0, 100.0).await?;
    assert_eq!(
        statistics.fields[&FilterField::RegNo],
        vec![
            ValueCount {
                value: None,
                count: 2
            },
            ValueCount {
                value: Some(FieldValue::from("N12345")),
                count: 2
            },
            ValueCount {
                value: Some(FieldValue::from("N54321")),
                count: 1
            },
        ]
    );
    Ok(())
}
