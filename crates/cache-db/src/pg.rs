//! Reference `QueryBuilder` implementation over a `sqlx::Postgres` transaction.
//!
//! This is one concrete adapter for the abstract boundary in
//! [`crate::query_builder`] — useful for integration tests and as a worked
//! example of how a dialect plugs in. Schema/table definitions and the
//! decision of *which* Postgres dialect variant to speak are out of scope;
//! this module only fulfills the trait.

use async_trait::async_trait;
use sqlx::{Column, Postgres, Row as SqlxRow, Transaction, TypeInfo, ValueRef};

use crate::error::{Error, Result};
use crate::query_builder::{PrimaryKey, QueryBuilder};
use crate::table::Table;
use crate::value::{Row, Value};

/// `QueryBuilder` backed by a single `sqlx::Transaction<'static, Postgres>`.
///
/// One instance models one transaction-scoped handle, matching the "qb
/// context" the cache is handed via its setter (spec §4.1): a fresh
/// `PgQueryBuilder` is created per transaction and reassigned into the
/// cache between flush phases.
pub struct PgQueryBuilder {
   tx: Transaction<'static, Postgres>,
}

impl PgQueryBuilder {
   pub fn new(tx: Transaction<'static, Postgres>) -> Self {
      Self { tx }
   }

   pub fn into_transaction(self) -> Transaction<'static, Postgres> {
      self.tx
   }

   fn pk_where_clause(table: &dyn Table, start: usize) -> (String, usize) {
      let mut clauses = Vec::with_capacity(table.primary_key_columns().len());
      let mut next = start;
      for col in table.primary_key_columns() {
         clauses.push(format!("{col} = ${next}"));
         next += 1;
      }
      (clauses.join(" AND "), next)
   }

   fn bind_pk<'q>(
      mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
      table: &dyn Table,
      key: &'q PrimaryKey,
   ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
      for col in table.primary_key_columns() {
         query = bind_value(query, key.get(col).unwrap_or(&Value::Null));
      }
      query
   }
}

fn bind_value<'q>(
   query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
   value: &'q Value,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
   match value {
      Value::Null => query.bind(None::<i64>),
      Value::Int(v) => query.bind(*v),
      Value::BigInt(v) => query.bind(*v),
      Value::Float(v) => query.bind(*v),
      Value::Bool(v) => query.bind(*v),
      Value::Text(v) => query.bind(v.as_str()),
      Value::Bytes(v) => query.bind(v.as_slice()),
      Value::Json(v) => query.bind(v.clone()),
   }
}

fn classify_copy_finish_error(err: sqlx::Error) -> Error {
   if err.as_database_error().is_some() {
      Error::Database(err.to_string())
   } else {
      Error::CopyTransport(err.to_string())
   }
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<Row> {
   let mut out = Row::new();
   for column in row.columns() {
      let raw = row.try_get_raw(column.ordinal())?;
      let value = if raw.is_null() {
         Value::Null
      } else {
         let type_name = raw.type_info().name();
         match type_name {
            "INT4" => Value::Int(row.try_get(column.ordinal())?),
            "INT8" => Value::BigInt(row.try_get(column.ordinal())?),
            "FLOAT4" | "FLOAT8" => Value::Float(row.try_get(column.ordinal())?),
            "BOOL" => Value::Bool(row.try_get(column.ordinal())?),
            "BYTEA" => Value::Bytes(row.try_get(column.ordinal())?),
            "JSON" | "JSONB" => Value::Json(row.try_get(column.ordinal())?),
            _ => Value::Text(row.try_get(column.ordinal())?),
         }
      };
      out.insert(column.name().to_string(), value);
   }
   Ok(out)
}

#[async_trait]
impl QueryBuilder for PgQueryBuilder {
   async fn select_by_pk(&mut self, table: &dyn Table, key: &PrimaryKey) -> Result<Option<Row>> {
      let (where_clause, _) = Self::pk_where_clause(table, 1);
      let sql = format!("SELECT * FROM {} WHERE {}", table.name(), where_clause);
      let query = Self::bind_pk(sqlx::query(&sql), table, key);
      let row = query.fetch_optional(&mut *self.tx).await?;
      row.as_ref().map(decode_row).transpose()
   }

   async fn delete_returning(
      &mut self,
      table: &dyn Table,
      key: &PrimaryKey,
   ) -> Result<Option<Row>> {
      let (where_clause, _) = Self::pk_where_clause(table, 1);
      let sql = format!(
         "DELETE FROM {} WHERE {} RETURNING *",
         table.name(),
         where_clause
      );
      let query = Self::bind_pk(sqlx::query(&sql), table, key);
      let row = query.fetch_optional(&mut *self.tx).await?;
      row.as_ref().map(decode_row).transpose()
   }

   async fn select_by_pks_any(
      &mut self,
      table: &dyn Table,
      keys: &[PrimaryKey],
   ) -> Result<Vec<Row>> {
      if keys.is_empty() {
         return Ok(Vec::new());
      }
      let mut clauses = Vec::with_capacity(keys.len());
      let mut next = 1usize;
      for _ in keys {
         let (clause, advanced) = Self::pk_where_clause(table, next);
         clauses.push(format!("({clause})"));
         next = advanced;
      }
      let sql = format!(
         "SELECT * FROM {} WHERE {}",
         table.name(),
         clauses.join(" OR ")
      );
      let mut query = sqlx::query(&sql);
      for key in keys {
         for col in table.primary_key_columns() {
            query = bind_value(query, key.get(col).unwrap_or(&Value::Null));
         }
      }
      let rows = query.fetch_all(&mut *self.tx).await?;
      rows.iter().map(decode_row).collect()
   }

   async fn insert_values(&mut self, table: &dyn Table, rows: &[Row]) -> Result<()> {
      for row in rows {
         let columns = table.columns();
         let col_list = columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
         let placeholders = (1..=columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
         let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            col_list,
            placeholders
         );
         let mut query = sqlx::query(&sql);
         for col in columns {
            query = bind_value(query, row.get(&col.name).unwrap_or(&Value::Null));
         }
         query.execute(&mut *self.tx).await?;
      }
      Ok(())
   }

   async fn insert_on_conflict_update(&mut self, table: &dyn Table, rows: &[Row]) -> Result<()> {
      for row in rows {
         let columns = table.columns();
         let col_list = columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
         let placeholders = (1..=columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
         let pk_list = table.primary_key_columns().join(", ");
         let update_set = columns
            .iter()
            .filter(|c| !table.primary_key_columns().contains(&c.name))
            .map(|c| format!("{0} = EXCLUDED.{0}", c.name))
            .collect::<Vec<_>>()
            .join(", ");
         let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            table.name(),
            col_list,
            placeholders,
            pk_list,
            update_set
         );
         let mut query = sqlx::query(&sql);
         for col in columns {
            query = bind_value(query, row.get(&col.name).unwrap_or(&Value::Null));
         }
         query.execute(&mut *self.tx).await?;
      }
      Ok(())
   }

   async fn execute_raw(&mut self, sql: &str) -> Result<()> {
      sqlx::query(sql)
         .execute(&mut *self.tx)
         .await
         .map_err(Error::from)?;
      Ok(())
   }

   async fn copy_in(
      &mut self,
      table: &dyn Table,
      text: &str,
      include_schema: bool,
   ) -> Result<()> {
      let target = if include_schema {
         table.name().to_string()
      } else {
         table
            .name()
            .rsplit('.')
            .next()
            .unwrap_or(table.name())
            .to_string()
      };
      let col_list = table
         .columns()
         .iter()
         .map(|c| c.name.clone())
         .collect::<Vec<_>>()
         .join(", ");
      let sql = format!("COPY {target} ({col_list}) FROM STDIN WITH (FORMAT text)");
      let mut copy_in = self
         .tx
         .copy_in_raw(&sql)
         .await
         .map_err(|e| Error::CopyTransport(e.to_string()))?;
      copy_in
         .send(text.as_bytes())
         .await
         .map_err(|e| Error::CopyTransport(e.to_string()))?;
      // Constraint violations in the staged data (e.g. a duplicate primary
      // key) surface here, as an ordinary database error, not a transport
      // failure — only classify as transport when there's no database error
      // attached, so the flush engine's bisector can tell them apart.
      copy_in.finish().await.map_err(classify_copy_finish_error)?;
      Ok(())
   }
}
