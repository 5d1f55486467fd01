//! Read-only row lookups returned as JSON objects

use rusqlite::types::ValueRef;
use rusqlite::{Params, Row};
use serde_json::{Map, Number, Value};

use super::DbPool;
use crate::{Error, Result};

/// One result row, column name to value
pub type JsonRow = Map<String, Value>;

/// Query helper over the lookup database
#[derive(Clone)]
pub struct LookupStore {
    pool: DbPool,
}

impl std::fmt::Debug for LookupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupStore").finish_non_exhaustive()
    }
}

impl LookupStore {
    /// Create a store over a connection pool
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run a query and return every row
    ///
    /// # Errors
    ///
    /// Returns error if the connection or the query fails
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Vec<JsonRow>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| (*c).to_string()).collect();

        let rows = stmt
            .query_map(params, |row| row_to_json(row, &columns))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Run a query and return the first row, if any
    ///
    /// # Errors
    ///
    /// Returns error if the connection or the query fails
    pub fn query_one<P: Params>(&self, sql: &str, params: P) -> Result<Option<JsonRow>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

fn row_to_json(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<JsonRow> {
    let mut map = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        };
        map.insert(name.clone(), value);
    }
    Ok(map)
}
