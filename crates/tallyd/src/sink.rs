//! SQLite-backed durable attendance log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_core::{AttendanceEvent, EventSink, SinkError};
use tokio_rusqlite::Connection;

use crate::store::StoreError;

/// Append-only attendance log. The in-memory ring buffer is the fast
/// path; this table is the durable backstop and feeds the export.
#[derive(Clone)]
pub struct SqliteEventSink {
    conn: Connection,
}

impl SqliteEventSink {
    /// Wrap an open database connection, ensuring the schema exists.
    pub async fn new(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS attendance (
                     seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                     identity_id  TEXT NOT NULL,
                     display_name TEXT NOT NULL,
                     recorded_at  TEXT NOT NULL,
                     confidence   REAL NOT NULL
                 )",
                [],
            )?;
            Ok(())
        })
        .await
        .map_err(StoreError::Unavailable)?;
        Ok(Self { conn })
    }

    /// Every durable record, oldest first.
    pub async fn read_all(&self) -> Result<Vec<AttendanceEvent>, SinkError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT identity_id, display_name, recorded_at, confidence
                     FROM attendance ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map([], row_to_tuple)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|err| SinkError::new(err.to_string()))?;
        Ok(decode_rows(rows))
    }
}

#[async_trait]
impl EventSink for SqliteEventSink {
    async fn append(&self, event: &AttendanceEvent) -> Result<(), SinkError> {
        let event = event.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (identity_id, display_name, recorded_at, confidence)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        event.identity_id,
                        event.display_name,
                        event.recorded_at.to_rfc3339(),
                        event.confidence as f64,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| SinkError::new(err.to_string()))
    }

    async fn read_recent(&self, n: usize) -> Result<Vec<AttendanceEvent>, SinkError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT identity_id, display_name, recorded_at, confidence
                     FROM attendance ORDER BY seq DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([n as i64], row_to_tuple)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|err| SinkError::new(err.to_string()))?;
        let mut events = decode_rows(rows);
        events.reverse(); // oldest first
        Ok(events)
    }
}

type Row = (String, String, String, f64);

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        row.get::<_, f64>(3)?,
    ))
}

fn decode_rows(rows: Vec<Row>) -> Vec<AttendanceEvent> {
    let mut events = Vec::with_capacity(rows.len());
    for (identity_id, display_name, recorded_at, confidence) in rows {
        match DateTime::parse_from_rfc3339(&recorded_at) {
            Ok(ts) => events.push(AttendanceEvent {
                identity_id,
                display_name,
                recorded_at: ts.with_timezone(&Utc),
                confidence: confidence as f32,
            }),
            Err(err) => tracing::warn!(
                id = %identity_id,
                raw = %recorded_at,
                error = %err,
                "skipping attendance row with unparsable timestamp"
            ),
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_sink() -> SqliteEventSink {
        let conn = Connection::open_in_memory().await.unwrap();
        SqliteEventSink::new(conn).await.unwrap()
    }

    fn event(id: &str, secs: i64) -> AttendanceEvent {
        AttendanceEvent {
            identity_id: id.into(),
            display_name: id.to_uppercase(),
            recorded_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            confidence: 95.5,
        }
    }

    #[tokio::test]
    async fn test_append_and_read_all() {
        let sink = open_sink().await;
        sink.append(&event("e1", 0)).await.unwrap();
        sink.append(&event("e2", 10)).await.unwrap();

        let all = sink.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], event("e1", 0));
        assert_eq!(all[1], event("e2", 10));
    }

    #[tokio::test]
    async fn test_read_recent_bounds_and_order() {
        let sink = open_sink().await;
        for i in 0..5 {
            sink.append(&event(&format!("e{i}"), i)).await.unwrap();
        }

        let recent = sink.read_recent(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|e| e.identity_id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e4"]);
    }

    #[tokio::test]
    async fn test_read_recent_fewer_than_requested() {
        let sink = open_sink().await;
        sink.append(&event("e1", 0)).await.unwrap();
        assert_eq!(sink.read_recent(10).await.unwrap().len(), 1);
    }
}
