//! SQLite-backed identity store.
//!
//! Encodings are stored as little-endian f32 blobs; rows that do not
//! decode to the configured dimensionality are skipped at load, never
//! guessed at.

use tally_core::{Encoding, Identity};
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be read or written. Callers keep their
    /// previous snapshot and retry on the next scheduled reload.
    #[error("identity store unavailable: {0}")]
    Unavailable(#[from] tokio_rusqlite::Error),
}

pub struct IdentityStore {
    conn: Connection,
}

impl IdentityStore {
    /// Wrap an open database connection, ensuring the schema exists.
    pub async fn new(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS identities (
                     id           TEXT PRIMARY KEY,
                     display_name TEXT NOT NULL,
                     encoding     BLOB NOT NULL
                 )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Load every enrolled identity whose encoding decodes to `dim` floats.
    pub async fn list_all(&self, dim: usize) -> Result<Vec<Identity>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, display_name, encoding FROM identities")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut identities = Vec::with_capacity(rows.len());
        for (id, display_name, blob) in rows {
            match decode_blob(&blob, dim) {
                Some(encoding) => identities.push(Identity {
                    id,
                    display_name,
                    encoding,
                }),
                None => tracing::warn!(
                    id = %id,
                    bytes = blob.len(),
                    expected = dim * 4,
                    "skipping identity with malformed encoding blob"
                ),
            }
        }
        Ok(identities)
    }

    /// Insert or replace one identity by id.
    pub async fn upsert(&self, identity: &Identity) -> Result<(), StoreError> {
        let id = identity.id.clone();
        let display_name = identity.display_name.clone();
        let blob = encode_blob(&identity.encoding);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities (id, display_name, encoding)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                         display_name = excluded.display_name,
                         encoding = excluded.encoding",
                    rusqlite::params![id, display_name, blob],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete an identity. Returns whether a row existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM identities WHERE id = ?1", [id])?)
            })
            .await?;
        Ok(changed > 0)
    }
}

fn encode_blob(encoding: &Encoding) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoding.dim() * 4);
    for v in &encoding.values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_blob(blob: &[u8], dim: usize) -> Option<Encoding> {
    if blob.len() != dim * 4 {
        return None;
    }
    let values = blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Some(Encoding::new(values))
}
