//! Persistence hook.
//!
//! One table per station (inside the configured schema), columns named after
//! the datums plus `tstamp`. Failures are the caller's to log; they are never
//! fatal and the reading stays in the station's fifo either way.

use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::reading::{DatumValue, Reading};

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
    schema: String,
}

impl Db {
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Db> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(8))
            .connect_lazy(&config.url())
            .with_context(|| {
                format!("Failed to create lazy database pool for {}", config.host)
            })?;
        Ok(Db {
            pool,
            schema: config.schema.clone(),
        })
    }

    pub async fn save_reading(&self, station: &str, reading: &Reading) -> Result<()> {
        let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO ");
        builder
            .push(quote_ident(&self.schema)?)
            .push(".")
            .push(quote_ident(station)?)
            .push(" (tstamp");
        for name in reading.datums.keys() {
            builder.push(", ").push(quote_ident(name)?);
        }
        builder.push(") VALUES (");
        {
            let mut values = builder.separated(", ");
            values.push_bind(reading.tstamp);
            for value in reading.datums.values() {
                match value {
                    DatumValue::Int(v) => values.push_bind(*v),
                    DatumValue::Float(v) => values.push_bind(*v),
                    DatumValue::Bool(v) => values.push_bind(*v),
                };
            }
        }
        builder.push(")");

        builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert a reading for station '{station}'"))?;
        Ok(())
    }
}

/// Station and datum names come from validated configuration, but they still
/// end up in SQL identifier position, so quote and restrict them.
fn quote_ident(name: &str) -> Result<String> {
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !well_formed {
        bail!("invalid SQL identifier '{name}'");
    }
    Ok(format!("\"{name}\""))
}
