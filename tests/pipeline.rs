//! End-to-end: import -> collection -> order -> ledger

use leadpipe::commands::{
    cmd_create_collection, cmd_import, cmd_init, cmd_map_column, cmd_order, cmd_purchases,
    cmd_status, open_db, open_store, ImportRequest, InitOptions, OrderRequest,
};
use leadpipe::dedup::DedupMode;
use leadpipe::error::Error;
use leadpipe::extract::parse_filters;
use leadpipe::ident::LeadId;
use leadpipe::reader::Delimiter;
use std::collections::HashSet;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn test_import_order_and_resale_protection() {
    let tmp = TempDir::new().unwrap();
    let config = cmd_init(InitOptions {
        base_dir: Some(tmp.path().join("home")),
        force: false,
    })
    .await
    .unwrap();
    let db = open_db(&config).await.unwrap();
    let store = open_store(&config).unwrap();

    // First table: one in-file duplicate, one ragged row
    let first = write(
        &tmp,
        "first.csv",
        "email,state,age\n\
         a@x.com,CA,30\n\
         b@x.com,NY,41\n\
         a@x.com,CA,30\n\
         c@x.com,CA\n\
         d@x.com,CA,19\n\
         e@x.com,CA,55\n",
    );
    let mut request = ImportRequest::new("acme", "first", &first);
    request.key_columns = vec!["email".to_string()];
    let one = cmd_import(&config, &db, store.clone(), request, false)
        .await
        .unwrap();
    assert_eq!(one.result.total_rows, 6);
    assert_eq!(one.result.skipped.ragged, 1);
    assert_eq!(one.result.in_file_duplicates, 1);
    assert_eq!(one.result.unique_rows, 4);

    // Second table, semicolon separated, overlaps the first on b@x.com
    let second = write(
        &tmp,
        "second.csv",
        "Email;ST;Years\nB@x.com;NY;41\nf@x.com;CA;33\ng@x.com;TX;60\n",
    );
    let mut request = ImportRequest::new("acme", "second", &second);
    request.key_columns = vec!["email".to_string()];
    request.mode = Some(DedupMode::Both);
    let two = cmd_import(&config, &db, store.clone(), request, false)
        .await
        .unwrap();
    assert_eq!(two.result.delimiter, Some(Delimiter::Semicolon));
    assert_eq!(two.result.database_duplicates, 1);
    assert_eq!(two.result.unique_rows, 2);
    assert!(two.result.database_duplicates_location.is_some());

    // Collection over both tables
    cmd_create_collection(&db, "acme", "west").await.unwrap();
    for (logical, table, physical) in [
        ("Email", "first", "email"),
        ("State", "first", "state"),
        ("Age", "first", "age"),
        ("Email", "second", "Email"),
        ("State", "second", "ST"),
        ("Age", "second", "Years"),
    ] {
        cmd_map_column(&db, "west", logical, table, physical)
            .await
            .unwrap();
    }

    // Matching leads: a (30), e (55) in first; f (33) in second
    let order = |budget| OrderRequest {
        buyer: "buyer-1".to_string(),
        collection: "west".to_string(),
        filters: parse_filters(
            r#"{"state": {"type": "one_of", "values": ["CA"]},
                "age": {"type": "number_range", "min": 21}}"#,
        )
        .unwrap(),
        budget,
        output_delimiter: Delimiter::Comma,
    };

    let first_order = cmd_order(&config, &db, &db, store.clone(), order(2))
        .await
        .unwrap();
    assert_eq!(first_order.result.matched, 2);
    assert_eq!(first_order.recorded, 2);

    let output = std::fs::read_to_string(config.paths.blob_root.join(&first_order.result.location))
        .unwrap();
    let mut lines = output.lines();
    assert_eq!(lines.next(), Some("lead_id,Email,State,Age"));
    let delivered: Vec<&str> = lines.collect();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|l| l.starts_with("LEAD-")));

    let second_order = cmd_order(&config, &db, &db, store.clone(), order(5))
        .await
        .unwrap();
    assert_eq!(second_order.result.matched, 1);
    assert!(second_order.result.already_purchased >= 2);

    let seen: HashSet<&LeadId> = first_order.result.lead_ids.iter().collect();
    assert!(second_order
        .result
        .lead_ids
        .iter()
        .all(|id| !seen.contains(id)));

    let summary = cmd_purchases(&db, "buyer-1", Some("west")).await.unwrap();
    assert_eq!(summary.purchased, 3);
    assert_eq!(summary.orders.len(), 2);

    let status = cmd_status(&config, &db).await.unwrap();
    assert_eq!(status.db_stats.table_count, 2);
    assert_eq!(status.db_stats.row_count, 6);
    assert_eq!(status.db_stats.purchase_count, 3);
}

#[tokio::test]
async fn test_order_without_readable_tables() {
    let tmp = TempDir::new().unwrap();
    let config = cmd_init(InitOptions {
        base_dir: Some(tmp.path().to_path_buf()),
        force: false,
    })
    .await
    .unwrap();
    let db = open_db(&config).await.unwrap();
    let store = open_store(&config).unwrap();

    let src = write(&tmp, "t.csv", "email,state\na@x.com,CA\n");
    let outcome = cmd_import(
        &config,
        &db,
        store.clone(),
        ImportRequest::new("acme", "t", &src),
        false,
    )
    .await
    .unwrap();
    cmd_create_collection(&db, "acme", "c").await.unwrap();
    cmd_map_column(&db, "c", "State", "t", "state").await.unwrap();

    // Table file disappears behind the metadata's back
    std::fs::remove_file(config.paths.blob_root.join(&outcome.result.location)).unwrap();

    let err = cmd_order(
        &config,
        &db,
        &db,
        store,
        OrderRequest {
            buyer: "b".to_string(),
            collection: "c".to_string(),
            filters: Default::default(),
            budget: 10,
            output_delimiter: Delimiter::Comma,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::NoDataAvailable(1)));
    assert_eq!(db.purchase_count("b", None).await.unwrap(), 0);
}
