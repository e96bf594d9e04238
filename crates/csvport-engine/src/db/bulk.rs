//! Bulk row loading.
//!
//! Accumulates rows into batches and ships each batch through the TDS
//! bulk-load channel on its own connection. Value conversion is lenient:
//! a field that does not parse as its column's type degrades to NULL,
//! and only an internal marshalling defect (a row whose width disagrees
//! with the column list) rejects the row. A failed batch reports every
//! one of its rows through the error sink and the loader moves on; there
//! are no retries.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;
use tiberius::{ColumnData, ToSql, TokenRow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::inference::{parse_bit, parse_date, parse_datetime, SqlColumnType, SqlTypeName};

use super::{connect_engine, schema::qualified_table};

/// A typed cell ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Bit(Option<bool>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Decimal(Option<Decimal>),
    Date(Option<NaiveDate>),
    DateTime(Option<NaiveDateTime>),
    Text(Option<String>),
}

impl CellValue {
    /// Convert a raw field by its column's inferred type.
    ///
    /// Empty or whitespace input is always NULL; parse failures on typed
    /// columns degrade to NULL rather than rejecting the row.
    pub fn from_raw(raw: &str, column_type: Option<&SqlColumnType>) -> Self {
        let value = raw.trim();
        let type_name = column_type.map(|t| t.type_name);

        if value.is_empty() {
            return Self::null_of(type_name);
        }

        match type_name {
            Some(SqlTypeName::Bit) => CellValue::Bit(parse_bit(value)),
            Some(SqlTypeName::Int) => CellValue::Int(value.parse().ok()),
            Some(SqlTypeName::BigInt) => CellValue::BigInt(value.parse().ok()),
            Some(SqlTypeName::Decimal) => CellValue::Decimal(Decimal::from_str(value).ok()),
            Some(SqlTypeName::Date) => CellValue::Date(parse_date(value)),
            Some(SqlTypeName::DateTime) => CellValue::DateTime(
                parse_datetime(value)
                    .or_else(|| parse_date(value).map(|d| d.and_time(chrono::NaiveTime::MIN))),
            ),
            Some(SqlTypeName::NVarChar) | None => CellValue::Text(Some(value.to_string())),
        }
    }

    fn null_of(type_name: Option<SqlTypeName>) -> Self {
        match type_name {
            Some(SqlTypeName::Bit) => CellValue::Bit(None),
            Some(SqlTypeName::Int) => CellValue::Int(None),
            Some(SqlTypeName::BigInt) => CellValue::BigInt(None),
            Some(SqlTypeName::Decimal) => CellValue::Decimal(None),
            Some(SqlTypeName::Date) => CellValue::Date(None),
            Some(SqlTypeName::DateTime) => CellValue::DateTime(None),
            Some(SqlTypeName::NVarChar) | None => CellValue::Text(None),
        }
    }

    fn wire_value(&self) -> ColumnData<'_> {
        match self {
            CellValue::Bit(v) => ColumnData::Bit(*v),
            CellValue::Int(v) => ColumnData::I32(*v),
            CellValue::BigInt(v) => ColumnData::I64(*v),
            CellValue::Decimal(v) => v.to_sql(),
            CellValue::Date(v) => v.to_sql(),
            CellValue::DateTime(v) => v.to_sql(),
            CellValue::Text(v) => match v {
                Some(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
                None => ColumnData::String(None),
            },
        }
    }
}

/// A source row: absolute line number plus raw fields.
pub type BulkRow = (u64, Vec<String>);

/// Stream rows into `[dbo].[table]` in batches.
///
/// `on_row_error` receives the absolute line number and a reason for
/// every row that could not be loaded. Returns the number of rows
/// successfully loaded. Cancellation abandons the batch being assembled
/// without flushing it.
#[allow(clippy::too_many_arguments)]
pub async fn bulk_insert<I>(
    connection_string: &str,
    table: &str,
    column_names: &[String],
    column_types: Option<&[SqlColumnType]>,
    rows: I,
    on_row_error: &mut (dyn FnMut(u64, String) + Send),
    batch_size: usize,
    batch_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<u64>
where
    I: IntoIterator<Item = BulkRow>,
{
    if column_names.is_empty() {
        return Err(EngineError::InvalidArgument(
            "Bulk insert requires at least one column".to_string(),
        ));
    }

    let mut inserted = 0u64;
    let mut batch: Vec<(u64, Vec<CellValue>)> = Vec::with_capacity(batch_size);
    let mut cancelled = false;

    for (line, fields) in rows {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        if fields.len() != column_names.len() {
            on_row_error(
                line,
                format!(
                    "Row has {} values for {} columns",
                    fields.len(),
                    column_names.len()
                ),
            );
            continue;
        }

        let cells: Vec<CellValue> = fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                CellValue::from_raw(field, column_types.and_then(|types| types.get(i)))
            })
            .collect();
        batch.push((line, cells));

        if batch.len() >= batch_size {
            inserted += flush_batch(
                connection_string,
                table,
                &batch,
                on_row_error,
                batch_timeout,
            )
            .await;
            batch.clear();
        }
    }

    if !cancelled && !batch.is_empty() {
        inserted += flush_batch(
            connection_string,
            table,
            &batch,
            on_row_error,
            batch_timeout,
        )
        .await;
    }

    Ok(inserted)
}

/// Submit one batch on a fresh connection.
///
/// Returns the number of rows loaded; a failure reports every row of the
/// batch through the sink and returns zero.
async fn flush_batch(
    connection_string: &str,
    table: &str,
    batch: &[(u64, Vec<CellValue>)],
    on_row_error: &mut (dyn FnMut(u64, String) + Send),
    batch_timeout: Duration,
) -> u64 {
    let attempt = async {
        let mut client = connect_engine(connection_string).await?;
        let qualified = qualified_table(table);
        let mut request = client
            .bulk_insert(&qualified)
            .await
            .map_err(|e| EngineError::database(format!("bulk insert into {}", table), e))?;

        for (_, cells) in batch {
            let mut row = TokenRow::new();
            for cell in cells {
                row.push(cell.wire_value());
            }
            request
                .send(row)
                .await
                .map_err(|e| EngineError::database(format!("bulk insert into {}", table), e))?;
        }

        let result = request
            .finalize()
            .await
            .map_err(|e| EngineError::database(format!("bulk insert into {}", table), e))?;
        Ok::<u64, EngineError>(result.total())
    };

    match tokio::time::timeout(batch_timeout, attempt).await {
        Ok(Ok(count)) => {
            debug!(table = table, rows = count, "Batch loaded");
            count
        }
        Ok(Err(e)) => {
            warn!(table = table, error = %e, "Batch failed");
            let reason = e.to_string();
            for (line, _) in batch {
                on_row_error(*line, reason.clone());
            }
            0
        }
        Err(_) => {
            let reason = format!(
                "Bulk copy timed out after {} seconds",
                batch_timeout.as_secs()
            );
            warn!(table = table, "Batch timed out");
            for (line, _) in batch {
                on_row_error(*line, reason.clone());
            }
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: SqlTypeName) -> SqlColumnType {
        SqlColumnType::simple(name, true)
    }

    #[test]
    fn test_empty_input_is_always_null() {
        assert_eq!(
            CellValue::from_raw("   ", Some(&ty(SqlTypeName::Int))),
            CellValue::Int(None)
        );
        assert_eq!(CellValue::from_raw("", None), CellValue::Text(None));
    }

    #[test]
    fn test_bit_conversion_table() {
        let bit = ty(SqlTypeName::Bit);
        for v in ["true", "1", "sim", "yes"] {
            assert_eq!(CellValue::from_raw(v, Some(&bit)), CellValue::Bit(Some(true)));
        }
        for v in ["false", "0", "não", "no"] {
            assert_eq!(CellValue::from_raw(v, Some(&bit)), CellValue::Bit(Some(false)));
        }
        assert_eq!(CellValue::from_raw("maybe", Some(&bit)), CellValue::Bit(None));
    }

    #[test]
    fn test_numeric_parse_failure_degrades_to_null() {
        assert_eq!(
            CellValue::from_raw("x", Some(&ty(SqlTypeName::Decimal))),
            CellValue::Decimal(None)
        );
        assert_eq!(
            CellValue::from_raw("12", Some(&ty(SqlTypeName::Int))),
            CellValue::Int(Some(12))
        );
        assert_eq!(
            CellValue::from_raw("notanumber", Some(&ty(SqlTypeName::BigInt))),
            CellValue::BigInt(None)
        );
    }

    #[test]
    fn test_date_and_datetime_conversion() {
        assert_eq!(
            CellValue::from_raw("2024-01-02", Some(&ty(SqlTypeName::Date))),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2))
        );
        // A bare date fills midnight when the column is datetime.
        let dt = CellValue::from_raw("2024-01-02", Some(&ty(SqlTypeName::DateTime)));
        assert_eq!(
            dt,
            CellValue::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 2).map(|d| d.and_hms_opt(0, 0, 0).unwrap())
            )
        );
        assert_eq!(
            CellValue::from_raw("garbage", Some(&ty(SqlTypeName::Date))),
            CellValue::Date(None)
        );
    }

    #[test]
    fn test_unknown_type_passes_trimmed_text() {
        assert_eq!(
            CellValue::from_raw("  hello ", None),
            CellValue::Text(Some("hello".to_string()))
        );
    }

    #[tokio::test]
    async fn test_width_mismatch_rejects_row_without_db() {
        // The malformed row is rejected during marshalling, before any
        // connection is attempted; cancellation then stops the loader
        // before it ever dials.
        let cancel = CancellationToken::new();
        let mut errors: Vec<(u64, String)> = Vec::new();

        let rows = vec![(2u64, vec!["only-one".to_string()])];
        let names = vec!["a".to_string(), "b".to_string()];
        let inserted = bulk_insert(
            "Server=unused",
            "TB_x",
            &names,
            None,
            rows,
            &mut |line, reason| errors.push((line, reason)),
            10,
            Duration::from_secs(1),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(inserted, 0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, 2);
    }

    #[tokio::test]
    async fn test_cancelled_loader_abandons_batch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut errors: Vec<(u64, String)> = Vec::new();

        let rows = vec![
            (2u64, vec!["1".to_string()]),
            (3u64, vec!["2".to_string()]),
        ];
        let names = vec!["a".to_string()];
        let inserted = bulk_insert(
            "Server=unused",
            "TB_x",
            &names,
            None,
            rows,
            &mut |line, reason| errors.push((line, reason)),
            10,
            Duration::from_secs(1),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(inserted, 0);
        assert!(errors.is_empty());
    }
}
