//! End-to-end coverage of the local pipeline stages: reader → inference
//! → identifiers, over real files on disk. Nothing here needs a
//! database.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use csvport_engine::csv::{CsvFile, RowEvent};
use csvport_engine::identifiers::table_name_for_file;
use csvport_engine::inference::{infer_column_type, SqlTypeName};
use tokio_util::sync::CancellationToken;

async fn columns_of(path: &Path) -> (CsvFile, Vec<Vec<String>>) {
    let csv = CsvFile::open(path).await.unwrap();
    let mut samples: Vec<Vec<String>> = vec![Vec::new(); csv.header().len()];
    let mut rows = csv.rows(CancellationToken::new()).await.unwrap();
    while let Some(event) = rows.next_event().await.unwrap() {
        if let RowEvent::Row { fields, .. } = event {
            for (column, value) in samples.iter_mut().zip(fields) {
                column.push(value);
            }
        }
    }
    (csv, samples)
}

#[tokio::test]
async fn test_sales_file_infers_int_decimal_date() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales.csv");
    fs::write(&path, "id;amount;date\n1;10.50;2024-01-02\n2;x;2024/02/03\n").unwrap();

    let (csv, samples) = columns_of(&path).await;
    assert_eq!(csv.header(), &["id", "amount", "date"]);

    let types: Vec<_> = csv
        .header()
        .iter()
        .zip(&samples)
        .map(|(name, values)| infer_column_type(values, name))
        .collect();

    assert_eq!(types[0].type_name, SqlTypeName::Int);
    assert_eq!(types[1].type_name, SqlTypeName::Decimal);
    assert_eq!(types[1].precision, Some(3));
    assert_eq!(types[1].scale, Some(2));
    assert_eq!(types[2].type_name, SqlTypeName::Date);
}

#[tokio::test]
async fn test_users_file_infers_text_and_int() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.csv");
    fs::write(&path, "name,age\nAlice,30\nBob,\n").unwrap();

    let (csv, samples) = columns_of(&path).await;
    assert_eq!(csv.delimiter(), ",");

    let types: Vec<_> = csv
        .header()
        .iter()
        .zip(&samples)
        .map(|(name, values)| infer_column_type(values, name))
        .collect();

    assert_eq!(types[0].type_name, SqlTypeName::NVarChar);
    assert_eq!(types[0].precision, Some(255));
    // The empty value is excluded from the denominator.
    assert_eq!(types[1].type_name, SqlTypeName::Int);
    assert!(types[1].reliable);
}

#[tokio::test]
async fn test_duplicate_file_names_get_numbered_tables() {
    let mut chosen = HashSet::new();

    let first = table_name_for_file(Path::new("/in/sales.csv"), &chosen);
    assert_eq!(first, "TB_sales");
    chosen.insert(first);

    let second = table_name_for_file(Path::new("/in/sub/sales.csv"), &chosen);
    assert_eq!(second, "01_TB_sales");
}

#[tokio::test]
async fn test_malformed_line_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(&path, "a;b\nonly-one-field\n1;2\n").unwrap();

    let csv = CsvFile::open(&path).await.unwrap();
    let mut rows = csv.rows(CancellationToken::new()).await.unwrap();

    let mut good = 0;
    let mut bad = Vec::new();
    while let Some(event) = rows.next_event().await.unwrap() {
        match event {
            RowEvent::Row { .. } => good += 1,
            RowEvent::Malformed { line, .. } => bad.push(line),
        }
    }
    assert_eq!(good, 1);
    assert_eq!(bad, vec![2]);
}

#[tokio::test]
async fn test_synthetic_delimiters_round_trip() {
    for (delim, name) in [(";", "semi"), (",", "comma"), ("\t", "tab"), ("|", "pipe"), (":", "colon")] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{name}.csv"));
        let content = format!(
            "colx{d}coly{d}colz\nv1{d}v2{d}v3\nv4{d}v5{d}v6\n",
            d = delim
        );
        fs::write(&path, content).unwrap();

        let csv = CsvFile::open(&path).await.unwrap();
        assert_eq!(csv.delimiter(), delim, "delimiter {delim:?}");
        assert_eq!(csv.header().len(), 3);
    }
}

#[tokio::test]
async fn test_windows_1252_file_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latin.csv");
    // "região;até" in Windows-1252.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"regi\xE3o;at\xE9\n");
    bytes.extend_from_slice(b"sul;10\n");
    fs::write(&path, &bytes).unwrap();

    let csv = CsvFile::open(&path).await.unwrap();
    assert_eq!(csv.header(), &["região", "até"]);
}
