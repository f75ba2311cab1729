//! Star schema table definitions
//!
//! One static [`TableSpec`] per output table. The store loader derives its
//! DDL from these, the CSV exporter its headers, and the API its allow-list.

/// Column types used by the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Double,
    Text,
    Boolean,
}

impl SqlType {
    pub fn ddl(self) -> &'static str {
        match self {
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub ref_column: &'static str,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: Option<&'static str>,
    pub foreign_keys: &'static [ForeignKey],
}

impl TableSpec {
    pub fn is_fact(&self) -> bool {
        !self.foreign_keys.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|c| c.name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// One value in a row, in column order
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Cell {
    /// CSV rendering; floats use the shortest round-trip form
    pub fn to_field(&self) -> String {
        match self {
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => v.to_string(),
            Cell::Text(v) => v.clone(),
            Cell::Bool(v) => v.to_string(),
        }
    }
}

/// A row of one star schema table
pub trait TableRow {
    const SPEC: &'static TableSpec;

    fn cells(&self) -> Vec<Cell>;
}

const fn col(name: &'static str, sql_type: SqlType) -> Column {
    Column { name, sql_type }
}

const fn fk(column: &'static str, references: &'static str) -> ForeignKey {
    ForeignKey {
        column,
        references,
        ref_column: column,
    }
}

pub const TIME_DIM: TableSpec = TableSpec {
    name: "time_dim",
    columns: &[
        col("time_key", SqlType::BigInt),
        col("year", SqlType::BigInt),
        col("is_current_year", SqlType::Boolean),
    ],
    primary_key: Some("time_key"),
    foreign_keys: &[],
};

pub const SUBURB_DIM: TableSpec = TableSpec {
    name: "suburb_dim",
    columns: &[
        col("suburb_key", SqlType::BigInt),
        col("suburb_name", SqlType::Text),
    ],
    primary_key: Some("suburb_key"),
    foreign_keys: &[],
};

pub const VEHICLE_TYPE_DIM: TableSpec = TableSpec {
    name: "vehicle_type_dim",
    columns: &[
        col("vehicle_type_key", SqlType::BigInt),
        col("vehicle_type", SqlType::Text),
    ],
    primary_key: Some("vehicle_type_key"),
    foreign_keys: &[],
};

pub const FUEL_TYPE_DIM: TableSpec = TableSpec {
    name: "fuel_type_dim",
    columns: &[
        col("fuel_type_key", SqlType::BigInt),
        col("fuel_type", SqlType::Text),
        col("description", SqlType::Text),
    ],
    primary_key: Some("fuel_type_key"),
    foreign_keys: &[],
};

pub const EV_FACT: TableSpec = TableSpec {
    name: "ev_fact",
    columns: &[
        col("suburb_key", SqlType::BigInt),
        col("time_key", SqlType::BigInt),
        col("total_evs", SqlType::BigInt),
        col("bev_count", SqlType::BigInt),
        col("phev_count", SqlType::BigInt),
        col("avg_range_km", SqlType::Double),
        col("avg_price", SqlType::Double),
        col("ev_adoption_score", SqlType::Double),
    ],
    primary_key: None,
    foreign_keys: &[fk("suburb_key", "suburb_dim"), fk("time_key", "time_dim")],
};

pub const ENERGY_FACT: TableSpec = TableSpec {
    name: "energy_fact",
    columns: &[
        col("suburb_key", SqlType::BigInt),
        col("time_key", SqlType::BigInt),
        col("energy_consumption", SqlType::Double),
        col("energy_change_pct", SqlType::Double),
        col("no2_level", SqlType::Double),
        col("no2_change", SqlType::Double),
        col("no2_change_pct", SqlType::Double),
        col("ev_per_energy_unit", SqlType::Double),
        col("no2_per_ev", SqlType::Double),
    ],
    primary_key: None,
    foreign_keys: &[fk("suburb_key", "suburb_dim"), fk("time_key", "time_dim")],
};

pub const DIMENSION_TABLES: &[&TableSpec] =
    &[&TIME_DIM, &SUBURB_DIM, &VEHICLE_TYPE_DIM, &FUEL_TYPE_DIM];

pub const FACT_TABLES: &[&TableSpec] = &[&EV_FACT, &ENERGY_FACT];

/// Every table the pipeline writes; the API serves nothing else
pub const ALL_TABLES: &[&TableSpec] = &[
    &TIME_DIM,
    &SUBURB_DIM,
    &VEHICLE_TYPE_DIM,
    &FUEL_TYPE_DIM,
    &EV_FACT,
    &ENERGY_FACT,
];

pub fn find_table(name: &str) -> Option<&'static TableSpec> {
    ALL_TABLES.iter().copied().find(|t| t.name == name)
}
