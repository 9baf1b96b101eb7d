use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::domain::CoordKey;
use crate::errors::RoutingError;

/// The distance cache's persistent layer. Schema exactly as spec.md §6: a
/// table with `(origin_lat, origin_lng, dest_lat, dest_lng, meters, seconds,
/// created_at)` and a unique index on the four rounded coordinate columns.
/// Grounded on the teacher's `database/sqlx.rs::db_connection` — same
/// `SqliteConnectOptions` + `CREATE TABLE IF NOT EXISTS` idiom.
pub async fn connect(database_url: &str) -> Result<SqlitePool, RoutingError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| RoutingError::ValidationFailed {
            message: format!("invalid distance cache database url: {e}"),
        })?
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| RoutingError::DistanceUnavailable {
            origin_key: String::new(),
            dest_key: String::new(),
            reason: format!("failed connecting to distance cache db: {e}"),
        })?;

    info!("Connected to distance cache SQLite database at {database_url}");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS distance_cache (
            origin_lat REAL NOT NULL,
            origin_lng REAL NOT NULL,
            dest_lat REAL NOT NULL,
            dest_lng REAL NOT NULL,
            meters REAL NOT NULL,
            seconds REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(origin_lat, origin_lng, dest_lat, dest_lng)
        )
        "#,
    )
    .execute(&pool)
    .await
    .map_err(|e| RoutingError::DistanceUnavailable {
        origin_key: String::new(),
        dest_key: String::new(),
        reason: format!("failed creating distance_cache table: {e}"),
    })?;

    Ok(pool)
}

pub async fn read(
    pool: &SqlitePool,
    origin: &CoordKey,
    dest: &CoordKey,
) -> Result<Option<(f64, f64)>, RoutingError> {
    let (olat, olng) = origin.parts().ok_or_else(|| RoutingError::ValidationFailed {
        message: format!("malformed coordinate key: {}", origin.as_str()),
    })?;
    let (dlat, dlng) = dest.parts().ok_or_else(|| RoutingError::ValidationFailed {
        message: format!("malformed coordinate key: {}", dest.as_str()),
    })?;

    let row: Option<(f64, f64)> = sqlx::query_as(
        "SELECT meters, seconds FROM distance_cache
         WHERE origin_lat = ? AND origin_lng = ? AND dest_lat = ? AND dest_lng = ?",
    )
    .bind(olat)
    .bind(olng)
    .bind(dlat)
    .bind(dlng)
    .fetch_optional(pool)
    .await
    .map_err(|e| RoutingError::DistanceUnavailable {
        origin_key: origin.as_str().to_string(),
        dest_key: dest.as_str().to_string(),
        reason: format!("distance cache read failed: {e}"),
    })?;

    Ok(row)
}

pub async fn write(
    pool: &SqlitePool,
    origin: &CoordKey,
    dest: &CoordKey,
    meters: f64,
    seconds: f64,
) -> Result<(), RoutingError> {
    let (olat, olng) = origin.parts().ok_or_else(|| RoutingError::ValidationFailed {
        message: format!("malformed coordinate key: {}", origin.as_str()),
    })?;
    let (dlat, dlng) = dest.parts().ok_or_else(|| RoutingError::ValidationFailed {
        message: format!("malformed coordinate key: {}", dest.as_str()),
    })?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO distance_cache
            (origin_lat, origin_lng, dest_lat, dest_lng, meters, seconds)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(olat)
    .bind(olng)
    .bind(dlat)
    .bind(dlng)
    .bind(meters)
    .bind(seconds)
    .execute(pool)
    .await
    .map_err(|e| RoutingError::DistanceUnavailable {
        origin_key: origin.as_str().to_string(),
        dest_key: dest.as_str().to_string(),
        reason: format!("distance cache write failed: {e}"),
    })?;

    Ok(())
}
