use seedforge_core::{Payload, Row, SqlDialect, Value};

/// Quote an identifier for the target dialect. Embedded quotes are doubled.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| quote_identifier(f))
        .collect::<Vec<_>>()
        .join(", ")
}

fn returning(payload: &Payload) -> String {
    if payload.return_fields.is_empty() {
        String::new()
    } else {
        format!(" RETURNING {}", column_list(&payload.return_fields))
    }
}

/// Whether the driver has to read rows back. Without a primary key and
/// without auto fields, the payload rows already are the result.
pub(crate) fn needs_returning(payload: &Payload) -> bool {
    payload.primary_key.is_some() || !payload.auto_fields().is_empty()
}

/// One multi-row `INSERT ... VALUES ... RETURNING` statement for the whole
/// payload, with every value inlined as a literal.
///
/// A payload with no insert fields becomes one `DEFAULT VALUES` statement
/// per row, since neither dialect has a multi-row form of it.
pub(crate) fn build_insert(payload: &Payload, dialect: SqlDialect) -> Vec<String> {
    let table = quote_identifier(&payload.entity);
    let returning = if needs_returning(payload) {
        returning(payload)
    } else {
        String::new()
    };

    if payload.insert_fields.is_empty() {
        return payload
            .rows
            .iter()
            .map(|_| format!("INSERT INTO {} DEFAULT VALUES{}", table, returning))
            .collect();
    }

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        table,
        column_list(&payload.insert_fields)
    );
    for (i, row) in payload.rows.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (j, field) in payload.insert_fields.iter().enumerate() {
            if j > 0 {
                sql.push_str(", ");
            }
            let literal = row
                .get(field)
                .map(|v| v.to_sql_literal(dialect))
                .unwrap_or_else(|| "NULL".to_string());
            sql.push_str(&literal);
        }
        sql.push(')');
    }
    sql.push_str(&returning);
    vec![sql]
}

/// Put returned rows back in insertion order when the key is assigned by
/// the database: `RETURNING` order is not guaranteed, generated integer
/// keys are increasing.
pub(crate) fn order_by_generated_key(payload: &Payload, rows: &mut [Row]) {
    let Some(pk) = payload.primary_key.as_deref() else {
        return;
    };
    if !payload.auto_fields().iter().any(|f| f == pk) {
        return;
    }
    if rows.iter().all(|r| r.get(pk).and_then(Value::as_int).is_some()) {
        rows.sort_by_key(|r| r.get(pk).and_then(Value::as_int));
    }
}

/// Truncate a SQL string for error messages.
pub(crate) fn truncate_sql(sql: &str, max_len: usize) -> String {
    if sql.len() <= max_len {
        return sql.to_string();
    }
    let mut end = max_len;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}
