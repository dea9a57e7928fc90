//! Search query compilation.

use warden_core::error::DomainError;
use warden_core::search::{Columns, Field, Filter, FilterValue, SearchQuery};

use crate::dialect::Dialect;
use crate::schema;

/// A value bound to one numbered parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    /// Text parameter.
    Text(String),
    /// Text array parameter, compared with `ANY`.
    TextList(Vec<String>),
    /// 64-bit integer parameter.
    BigInt(i64),
}

/// SQL text with numbered parameters and the values to bind, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    /// Statement text.
    pub sql: String,
    /// Bind values for `$1..$n`.
    pub binds: Vec<BindValue>,
    /// Projection the statement returns.
    pub columns: Columns,
}

/// Compiles `query` for `dialect`.
///
/// Filters of one group are joined with `AND`. Several groups are
/// parenthesized and joined with `OR`. Parameters are numbered left to right.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` if the query or one of its groups
/// has no filters, a filter is malformed, the dialect cannot express a field
/// or operation, or a bound number does not fit the database integer type.
pub fn compile(dialect: &dyn Dialect, query: &SearchQuery) -> Result<CompiledQuery, DomainError> {
    if query.filters.is_empty() || query.filters.iter().any(Vec::is_empty) {
        return Err(DomainError::InvalidArgument(
            "search query has no filters".to_owned(),
        ));
    }

    let mut binds = Vec::with_capacity(query.filters.iter().map(Vec::len).sum::<usize>() + 1);
    let mut groups = Vec::with_capacity(query.filters.len());
    for group in &query.filters {
        let mut conditions = Vec::with_capacity(group.len());
        for filter in group {
            conditions.push(condition(dialect, filter)?);
            binds.push(bind_value(&filter.value)?);
        }
        groups.push(conditions.join(" AND "));
    }
    let clause = if groups.len() == 1 {
        groups.remove(0)
    } else {
        groups
            .iter()
            .map(|group| format!("({group})"))
            .collect::<Vec<_>>()
            .join(" OR ")
    };

    let sequence = dialect.column_name(Field::Sequence);
    let mut sql = match query.columns {
        Columns::Event => format!(
            "SELECT {} FROM {}",
            schema::EVENT_COLUMNS,
            dialect.events_table()
        ),
        Columns::MaxSequence => format!("SELECT MAX({sequence}) FROM {}", dialect.events_table()),
    };
    sql.push_str(" WHERE ");
    sql.push_str(&clause);

    if query.columns == Columns::Event {
        let direction = if query.desc { " DESC" } else { "" };
        sql.push_str(&format!(" ORDER BY {sequence}{direction}, id{direction}"));
        if query.limit > 0 {
            sql.push_str(" LIMIT ?");
            binds.push(BindValue::BigInt(to_big_int(query.limit)?));
        }
    }

    let sql = dialect.placeholder(&sql);
    tracing::debug!(sql = %sql, binds = binds.len(), "compiled search query");
    Ok(CompiledQuery {
        sql,
        binds,
        columns: query.columns,
    })
}

fn condition(dialect: &dyn Dialect, filter: &Filter) -> Result<String, DomainError> {
    if !filter.is_well_formed() {
        return Err(DomainError::InvalidArgument(format!(
            "filter on {:?} with {:?} has a mismatched value",
            filter.field, filter.operation
        )));
    }
    let column = dialect.column_name(filter.field);
    let operation = dialect.operation(filter.operation);
    if column.is_empty() || operation.is_empty() {
        return Err(DomainError::InvalidArgument(format!(
            "filter on {:?} with {:?} is not supported",
            filter.field, filter.operation
        )));
    }
    Ok(dialect
        .condition_format(filter.operation)
        .replace("{column}", column)
        .replace("{operation}", operation))
}

fn bind_value(value: &FilterValue) -> Result<BindValue, DomainError> {
    Ok(match value {
        FilterValue::Text(text) => BindValue::Text(text.clone()),
        FilterValue::TextList(values) => BindValue::TextList(values.clone()),
        FilterValue::Sequence(sequence) => BindValue::BigInt(to_big_int(*sequence)?),
    })
}

fn to_big_int(value: u64) -> Result<i64, DomainError> {
    i64::try_from(value)
        .map_err(|_| DomainError::InvalidArgument(format!("{value} exceeds the sequence range")))
}
