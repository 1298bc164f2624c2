use super::snapshot::InsertBatch;
use super::table_ref::TableRef;

pub(crate) fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

pub(crate) fn build_truncate_sql(table: &str) -> String {
    format!("TRUNCATE TABLE IF EXISTS {};", table)
}

pub(crate) fn build_select_sql(table: &TableRef) -> String {
    format!("SELECT * FROM {}", table.qualified())
}

pub(crate) fn build_insert_sql(table: &TableRef, batch: &InsertBatch) -> String {
    let values = batch
        .rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Some(v) => format!("'{}'", escape_sql_string(v)),
                    None => "NULL".to_string(),
                })
                .collect();
            format!("({})", cells.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n                ");

    format!(
        r#"
            INSERT INTO {table} ({columns})
            VALUES
                {values}
            "#,
        table = table.qualified(),
        columns = batch.columns.join(", "),
        values = values,
    )
}
