//! Destination table management.
//!
//! Creates, drops and inspects data tables in the `dbo` schema. All DDL
//! is idempotent and every identifier substitution doubles `]` so a
//! hostile name cannot break out of its brackets.

use std::collections::HashSet;

use crate::error::{EngineError, Result};
use crate::inference::SqlColumnType;

use super::connect_engine;

/// Escape an identifier for use inside `[...]` brackets.
pub fn escape_identifier(name: &str) -> String {
    name.replace(']', "]]")
}

/// Fully qualified, bracket-quoted table reference in `dbo`.
pub fn qualified_table(name: &str) -> String {
    format!("[dbo].[{}]", escape_identifier(name))
}

fn object_id_literal(name: &str) -> String {
    qualified_table(name).replace('\'', "''")
}

/// Create a destination table if it does not already exist.
///
/// Columns are emitted in the given order, all nullable. An empty column
/// set is an invalid argument.
pub async fn create_table(
    connection_string: &str,
    table: &str,
    columns: &[(String, SqlColumnType)],
) -> Result<()> {
    if columns.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "Cannot create table '{}' without columns",
            table
        )));
    }

    let defs: Vec<String> = columns
        .iter()
        .map(|(name, ty)| {
            format!(
                "[{}] {} NULL",
                escape_identifier(name),
                ty.to_sql_definition()
            )
        })
        .collect();

    let sql = format!(
        "IF OBJECT_ID(N'{0}', N'U') IS NULL CREATE TABLE {1} ({2})",
        object_id_literal(table),
        qualified_table(table),
        defs.join(", ")
    );

    let mut client = connect_engine(connection_string).await?;
    client
        .simple_query(&sql)
        .await
        .map_err(|e| EngineError::database(format!("create table {}", table), e))?
        .into_results()
        .await
        .map_err(|e| EngineError::database(format!("create table {}", table), e))?;

    Ok(())
}

/// Drop a destination table if it exists.
pub async fn drop_table(connection_string: &str, table: &str) -> Result<()> {
    let sql = format!(
        "IF OBJECT_ID(N'{0}', N'U') IS NOT NULL DROP TABLE {1}",
        object_id_literal(table),
        qualified_table(table)
    );

    let mut client = connect_engine(connection_string).await?;
    client
        .simple_query(&sql)
        .await
        .map_err(|e| EngineError::database(format!("drop table {}", table), e))?
        .into_results()
        .await
        .map_err(|e| EngineError::database(format!("drop table {}", table), e))?;

    Ok(())
}

/// Whether a user table with this name exists in `dbo`.
pub async fn table_exists(connection_string: &str, table: &str) -> Result<bool> {
    let mut client = connect_engine(connection_string).await?;
    let row = client
        .query(
            "SELECT CASE WHEN OBJECT_ID(@P1, N'U') IS NULL THEN 0 ELSE 1 END",
            &[&qualified_table(table)],
        )
        .await
        .map_err(|e| EngineError::database("table exists", e))?
        .into_row()
        .await
        .map_err(|e| EngineError::database("table exists", e))?;

    Ok(row
        .and_then(|r| r.get::<i32, _>(0))
        .map(|v| v != 0)
        .unwrap_or(false))
}

/// Names of all user tables in `dbo`, used to seed collision detection.
pub async fn existing_table_names(connection_string: &str) -> Result<HashSet<String>> {
    let mut client = connect_engine(connection_string).await?;
    let rows = client
        .simple_query(
            "SELECT o.name FROM sys.objects o \
             JOIN sys.schemas s ON s.schema_id = o.schema_id \
             WHERE o.type = 'U' AND s.name = 'dbo'",
        )
        .await
        .map_err(|e| EngineError::database("list tables", e))?
        .into_first_result()
        .await
        .map_err(|e| EngineError::database("list tables", e))?;

    let mut names = HashSet::new();
    for row in rows {
        if let Some(name) = row.get::<&str, _>(0) {
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{SqlTypeName, SqlColumnType};

    #[test]
    fn test_escape_doubles_closing_bracket() {
        assert_eq!(escape_identifier("plain"), "plain");
        assert_eq!(escape_identifier("odd]name"), "odd]]name");
        assert_eq!(qualified_table("odd]name"), "[dbo].[odd]]name]");
    }

    #[tokio::test]
    async fn test_create_table_rejects_empty_columns() {
        let err = create_table("Server=ignored", "TB_x", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_column_definition_rendering() {
        let columns = vec![
            ("id".to_string(), SqlColumnType::simple(SqlTypeName::Int, true)),
            (
                "amount".to_string(),
                SqlColumnType {
                    type_name: SqlTypeName::Decimal,
                    precision: Some(3),
                    scale: Some(2),
                    reliable: false,
                },
            ),
        ];
        let defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("[{}] {} NULL", escape_identifier(name), ty.to_sql_definition()))
            .collect();
        assert_eq!(defs, vec!["[id] int NULL", "[amount] decimal(3,2) NULL"]);
    }
}
