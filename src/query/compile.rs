//! Translation of a [`FilterSpec`] into SQL.
//!
//! Column names only ever come from static allow-lists; every filter value
//! goes through `push_bind`, and LIKE wildcards inside values are escaped.

use sqlx::{QueryBuilder, Sqlite};

use crate::models::{fold_text, format_timestamp, FilterSpec, SEARCH_COLUMNS};

/// Appends the WHERE clause for every active filter.
pub fn push_predicates(qb: &mut QueryBuilder<'_, Sqlite>, spec: &FilterSpec) {
    qb.push(" WHERE 1 = 1");

    if let Some(from) = &spec.net_from {
        qb.push(" AND net >= ").push_bind(format_timestamp(from));
    }
    if let Some(to) = &spec.net_to {
        qb.push(" AND net <= ").push_bind(format_timestamp(to));
    }

    for (column, value) in spec.text_filters() {
        qb.push(" AND ");
        push_contains(qb, column, value);
    }

    for (column, value) in spec.exact_filters() {
        qb.push(" AND ")
            .push(column)
            .push(" = ")
            .push_bind(value.to_string());
    }

    if let Some(search) = &spec.search {
        qb.push(" AND (");
        for (i, column) in SEARCH_COLUMNS.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            push_contains(qb, column, search);
        }
        qb.push(")");
    }
}

/// Appends ORDER BY with `id` as the tie-breaker so pages never overlap.
pub fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, spec: &FilterSpec) {
    qb.push(" ORDER BY ")
        .push(spec.sort().column())
        .push(" ")
        .push(spec.direction().keyword())
        .push(", id ASC");
}

pub fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, spec: &FilterSpec) {
    qb.push(" LIMIT ")
        .push_bind(i64::from(spec.limit()))
        .push(" OFFSET ")
        .push_bind(spec.offset() as i64);
}

/// Substring match against the column's folded copy.
fn push_contains(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, value: &str) {
    qb.push(column)
        .push("_folded LIKE ")
        .push_bind(format!("%{}%", escape_like(&fold_text(value))))
        .push(" ESCAPE '\\'");
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
