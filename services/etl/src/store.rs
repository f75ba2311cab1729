//! Store Loader - full-table replace into Postgres
//!
//! Sequence: drop facts, drop dimensions, create + fill dimensions, create +
//! fill facts, add primary keys, add foreign keys. A failed constraint
//! statement is logged and recorded in the [`LoadReport`]; rows already
//! written stay in place.

use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::dimensions::Dimensions;
use crate::error::Result;
use crate::facts::Facts;
use crate::schema::{Cell, ForeignKey, TableRow, TableSpec, DIMENSION_TABLES, FACT_TABLES};

/// Rows per INSERT statement; keeps bind counts far below the 65535 limit
const INSERT_CHUNK: usize = 1000;

/// A constraint that could not be applied. The run still completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintWarning {
    pub table: String,
    pub constraint: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows: BTreeMap<&'static str, u64>,
    pub warnings: Vec<ConstraintWarning>,
}

/// Explicitly opened store handle. Dropping it without [`close`](Self::close)
/// leaves connection teardown to the pool.
pub struct StoreClient {
    pool: PgPool,
}

impl StoreClient {
    pub async fn open(db_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        info!(max_connections, "Connected to store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!("Store connection pool closed");
    }

    pub async fn load(&self, dims: &Dimensions, facts: &Facts) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for spec in drop_order() {
            sqlx::query(&drop_table_sql(spec))
                .execute(&self.pool)
                .await?;
        }

        self.replace(&dims.time, &mut report).await?;
        self.replace(&dims.suburb, &mut report).await?;
        self.replace(&dims.vehicle_type, &mut report).await?;
        self.replace(&dims.fuel_type, &mut report).await?;
        self.replace(&facts.ev, &mut report).await?;
        self.replace(&facts.energy, &mut report).await?;

        for (spec, constraint, sql) in constraint_plan() {
            if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                warn!(
                    table = spec.name,
                    constraint = %constraint,
                    error = %e,
                    "Constraint not applied; data left in place"
                );
                report.warnings.push(ConstraintWarning {
                    table: spec.name.to_string(),
                    constraint,
                    error: e.to_string(),
                });
            }
        }

        info!(
            tables = report.rows.len(),
            warnings = report.warnings.len(),
            "Store load finished"
        );
        Ok(report)
    }

    /// Create one table and insert its rows
    async fn replace<R: TableRow>(&self, rows: &[R], report: &mut LoadReport) -> Result<()> {
        let spec = R::SPEC;
        sqlx::query(&create_table_sql(spec))
            .execute(&self.pool)
            .await?;

        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(spec));
            qb.push_values(chunk, |mut b, row| {
                for cell in row.cells() {
                    match cell {
                        Cell::Int(v) => b.push_bind(v),
                        Cell::Float(v) => b.push_bind(v),
                        Cell::Text(v) => b.push_bind(v),
                        Cell::Bool(v) => b.push_bind(v),
                    };
                }
            });
            inserted += qb.build().execute(&self.pool).await?.rows_affected();
        }

        info!(table = spec.name, rows = inserted, "Table replaced");
        report.rows.insert(spec.name, inserted);
        Ok(())
    }
}

/// Facts reference dimensions, so they go first
pub fn drop_order() -> Vec<&'static TableSpec> {
    FACT_TABLES
        .iter()
        .chain(DIMENSION_TABLES.iter())
        .copied()
        .collect()
}

pub fn drop_table_sql(spec: &TableSpec) -> String {
    format!("DROP TABLE IF EXISTS {}", spec.name)
}

pub fn create_table_sql(spec: &TableSpec) -> String {
    let columns: Vec<String> = spec
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type.ddl()))
        .collect();
    format!("CREATE TABLE {} ({})", spec.name, columns.join(", "))
}

fn insert_prefix(spec: &TableSpec) -> String {
    let columns: Vec<&str> = spec.column_names().collect();
    format!("INSERT INTO {} ({}) ", spec.name, columns.join(", "))
}

pub fn primary_key_sql(spec: &TableSpec) -> Option<(String, String)> {
    spec.primary_key.map(|pk| {
        let name = format!("{}_pkey", spec.name);
        let sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            spec.name, name, pk
        );
        (name, sql)
    })
}

pub fn foreign_key_sql(spec: &TableSpec, fk: &ForeignKey) -> (String, String) {
    let name = format!("{}_{}_fkey", spec.name, fk.column);
    let sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        spec.name, name, fk.column, fk.references, fk.ref_column
    );
    (name, sql)
}

/// Primary keys on every dimension, then foreign keys on every fact.
/// Each entry is (table, constraint name, statement).
pub fn constraint_plan() -> Vec<(&'static TableSpec, String, String)> {
    let mut plan = Vec::new();
    for spec in DIMENSION_TABLES.iter().copied() {
        if let Some((name, sql)) = primary_key_sql(spec) {
            plan.push((spec, name, sql));
        }
    }
    for spec in FACT_TABLES.iter().copied() {
        for fk in spec.foreign_keys {
            let (name, sql) = foreign_key_sql(spec, fk);
            plan.push((spec, name, sql));
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ENERGY_FACT, EV_FACT, SUBURB_DIM, TIME_DIM};

    #[test]
    fn test_drop_order_facts_first() {
        let names: Vec<&str> = drop_order().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "ev_fact",
                "energy_fact",
                "time_dim",
                "suburb_dim",
                "vehicle_type_dim",
                "fuel_type_dim"
            ]
        );
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql(&TIME_DIM),
            "CREATE TABLE time_dim (time_key BIGINT, year BIGINT, is_current_year BOOLEAN)"
        );
        assert_eq!(
            create_table_sql(&SUBURB_DIM),
            "CREATE TABLE suburb_dim (suburb_key BIGINT, suburb_name TEXT)"
        );
    }

    #[test]
    fn test_insert_prefix() {
        assert_eq!(
            insert_prefix(&SUBURB_DIM),
            "INSERT INTO suburb_dim (suburb_key, suburb_name) "
        );
    }

    #[test]
    fn test_constraint_plan_orders_primary_before_foreign_keys() {
        let plan = constraint_plan();
        let names: Vec<&str> = plan.iter().map(|(_, name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "time_dim_pkey",
                "suburb_dim_pkey",
                "vehicle_type_dim_pkey",
                "fuel_type_dim_pkey",
                "ev_fact_suburb_key_fkey",
                "ev_fact_time_key_fkey",
                "energy_fact_suburb_key_fkey",
                "energy_fact_time_key_fkey",
            ]
        );
    }

    #[test]
    fn test_foreign_key_sql() {
        let (name, sql) = foreign_key_sql(&ENERGY_FACT, &ENERGY_FACT.foreign_keys[0]);
        assert_eq!(name, "energy_fact_suburb_key_fkey");
        assert_eq!(
            sql,
            "ALTER TABLE energy_fact ADD CONSTRAINT energy_fact_suburb_key_fkey \
             FOREIGN KEY (suburb_key) REFERENCES suburb_dim (suburb_key)"
        );
        assert!(primary_key_sql(&EV_FACT).is_none());
    }
}
