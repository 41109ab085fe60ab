//! Typed single-table SELECT queries.
//!
//! Producers build queries with [`Query::select_all`] and [`Query::select`]; raw SQL
//! from the command line is accepted through [`Query::parse`]. Connectors either
//! render the query back to SQL ([`Query::to_sql`]) or interpret it directly.

use crate::error::{Error, Result};
use crate::record::Value;
use sqlparser::ast::{Expr, LimitClause, SelectItem, SetExpr, Statement, TableFactor};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::fmt;

/// MySQL has no OFFSET without LIMIT; this is the documented "all rows" bound.
const UNBOUNDED_LIMIT: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    projection: Projection,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn select_all(table: impl Into<String>) -> Self {
        Self { table: table.into(), projection: Projection::All, limit: None, offset: None }
    }

    pub fn select<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        Self { table: table.into(), projection: Projection::Columns(columns), limit: None, offset: None }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Renders the query with positional `?` placeholders for LIMIT and OFFSET.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        check_identifier(&self.table)?;
        let projection = match &self.projection {
            Projection::All => "*".to_string(),
            Projection::Columns(columns) if columns.is_empty() => {
                return Err(Error::Query("empty projection".to_string()));
            }
            Projection::Columns(columns) => {
                for column in columns {
                    check_identifier(column)?;
                }
                columns.join(", ")
            }
        };

        let mut sql = format!("SELECT {} FROM {}", projection, self.table);
        let mut params = Vec::new();
        match (self.limit, self.offset) {
            (None, None) => {}
            (limit, offset) => {
                sql.push_str(" LIMIT ?");
                params.push(Value::UInt(limit.unwrap_or(UNBOUNDED_LIMIT)));
                if let Some(offset) = offset {
                    sql.push_str(" OFFSET ?");
                    params.push(Value::UInt(offset));
                }
            }
        }
        Ok((sql, params))
    }

    /// Parses a single-table `SELECT` with optional `LIMIT`/`OFFSET`.
    ///
    /// `?` placeholders in LIMIT/OFFSET are bound from `params` in order.
    pub fn parse(sql: &str, params: &[Value]) -> Result<Self> {
        let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
        if statements.len() != 1 {
            return Err(Error::Query(format!("expected one statement, found {}", statements.len())));
        }
        let query = match statements.remove(0) {
            Statement::Query(query) => query,
            other => return Err(Error::Query(format!("not a SELECT: {}", other))),
        };
        if query.with.is_some() || query.order_by.is_some() {
            return Err(Error::Query("WITH and ORDER BY are not supported".to_string()));
        }

        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select,
            other => return Err(Error::Query(format!("unsupported query body: {}", other))),
        };
        if select.from.len() != 1 || !select.from[0].joins.is_empty() {
            return Err(Error::Query("expected exactly one table and no joins".to_string()));
        }
        if select.selection.is_some() || select.distinct.is_some() {
            return Err(Error::Query("WHERE and DISTINCT are not supported".to_string()));
        }
        let table = match &select.from[0].relation {
            TableFactor::Table { name, .. } => name.to_string().trim_matches('`').to_string(),
            other => return Err(Error::Query(format!("unsupported table factor: {}", other))),
        };

        let mut columns = Vec::new();
        let mut wildcard = false;
        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => wildcard = true,
                SelectItem::UnnamedExpr(Expr::Identifier(ident)) => columns.push(ident.value.clone()),
                other => return Err(Error::Query(format!("unsupported select item: {}", other))),
            }
        }
        let projection = match (wildcard, columns.is_empty()) {
            (true, true) => Projection::All,
            (false, false) => Projection::Columns(columns),
            _ => return Err(Error::Query("cannot mix * with named columns".to_string())),
        };

        let mut bound = params.iter();
        let (limit, offset) = match &query.limit_clause {
            None => (None, None),
            Some(LimitClause::LimitOffset { limit, offset, .. }) => {
                let limit = limit.as_ref().map(|expr| bind_count(expr, &mut bound)).transpose()?;
                let offset = offset.as_ref().map(|o| bind_count(&o.value, &mut bound)).transpose()?;
                (limit, offset)
            }
            Some(LimitClause::OffsetCommaLimit { offset, limit }) => {
                let offset = bind_count(offset, &mut bound)?;
                let limit = bind_count(limit, &mut bound)?;
                (Some(limit), Some(offset))
            }
        };
        if bound.next().is_some() {
            return Err(Error::Query(format!("too many parameters for: {}", sql)));
        }

        Ok(Self { table, projection, limit, offset })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.projection {
            Projection::All => write!(f, "SELECT * FROM {}", self.table)?,
            Projection::Columns(columns) => write!(f, "SELECT {} FROM {}", columns.join(", "), self.table)?,
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}

fn bind_count(expr: &Expr, params: &mut std::slice::Iter<'_, Value>) -> Result<u64> {
    use sqlparser::ast::Value as SqlValue;

    let value = match expr {
        Expr::Value(value) => &value.value,
        other => return Err(Error::Query(format!("unsupported LIMIT/OFFSET expression: {}", other))),
    };
    match value {
        SqlValue::Number(n, _) => {
            n.parse::<u64>().map_err(|_| Error::Query(format!("invalid LIMIT/OFFSET value: {}", n)))
        }
        SqlValue::Placeholder(name) => {
            let param = params
                .next()
                .ok_or_else(|| Error::Query(format!("no parameter bound for placeholder {}", name)))?;
            param
                .as_i64()
                .and_then(|v| u64::try_from(v).ok())
                .or(match param {
                    Value::UInt(v) => Some(*v),
                    _ => None,
                })
                .ok_or_else(|| Error::Query(format!("LIMIT/OFFSET parameter must be a count: {}", param)))
        }
        other => Err(Error::Query(format!("unsupported LIMIT/OFFSET value: {}", other))),
    }
}

/// Accepts plain SQL identifiers: ASCII letters, digits and `_`, not starting with a digit.
pub fn check_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::Query(format!("invalid identifier: '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_paginated_select() {
        let query = Query::select_all("user_data").limit(2).offset(4);
        let (sql, params) = query.to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM user_data LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::UInt(2), Value::UInt(4)]);
        assert_eq!(query.to_string(), "SELECT * FROM user_data LIMIT 2 OFFSET 4");
    }

    #[test]
    fn test_render_offset_without_limit() {
        let (sql, params) = Query::select_all("user_data").offset(3).to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM user_data LIMIT ? OFFSET ?");
        assert_eq!(params, vec![Value::UInt(u64::MAX), Value::UInt(3)]);
    }

    #[test]
    fn test_render_rejects_bad_identifiers() {
        let err = Query::select("user_data; DROP TABLE x", ["age"]).to_sql().unwrap_err();
        assert!(err.is_query());
        assert!(Query::select("user_data", Vec::<String>::new()).to_sql().is_err());
    }

    #[test]
    fn test_parse_projection() {
        let query = Query::parse("SELECT age FROM user_data", &[]).unwrap();
        assert_eq!(query, Query::select("user_data", ["age"]));

        let query = Query::parse("SELECT * FROM user_data", &[]).unwrap();
        assert_eq!(query, Query::select_all("user_data"));
    }

    #[test]
    fn test_parse_binds_placeholders_in_order() {
        let query =
            Query::parse("SELECT * FROM user_data LIMIT ? OFFSET ?", &[Value::Int(2), Value::Int(6)]).unwrap();
        assert_eq!(query.limit_value(), Some(2));
        assert_eq!(query.offset_value(), Some(6));
    }

    #[test]
    fn test_parse_mysql_comma_limit() {
        let query = Query::parse("SELECT name, email FROM user_data LIMIT 4, 2", &[]).unwrap();
        assert_eq!(query, Query::select("user_data", ["name", "email"]).limit(2).offset(4));
    }

    #[test]
    fn test_parse_rejects_unsupported_shapes() {
        assert!(Query::parse("DELETE FROM user_data", &[]).unwrap_err().is_query());
        assert!(Query::parse("SELECT * FROM user_data WHERE age > 25", &[]).unwrap_err().is_query());
        assert!(Query::parse("SELECT * FROM a JOIN b ON a.id = b.id", &[]).unwrap_err().is_query());
        assert!(Query::parse("SELEC * FROM user_data", &[]).unwrap_err().is_query());
    }

    #[test]
    fn test_parse_checks_parameter_count() {
        assert!(Query::parse("SELECT * FROM user_data LIMIT ?", &[]).is_err());
        assert!(Query::parse("SELECT * FROM user_data", &[Value::Int(1)]).is_err());
    }
}
