use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

use crate::catalog::{Catalog, QueueSource};
use crate::encode::{decode_genres, GENRES};
use crate::model::{CatalogRecord, QueueEntry};

pub const DEFAULT_DB_PATH: &str = "data/movies.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    let genre_columns: String = GENRES
        .iter()
        .map(|g| format!("            is_{g} BOOLEAN NOT NULL DEFAULT 0,\n"))
        .collect();

    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS movie_urls (
            movie_id      TEXT PRIMARY KEY,
            url           TEXT NOT NULL,
            is_deprecated BOOLEAN NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_movie_urls_deprecated ON movie_urls(is_deprecated);

        CREATE TABLE IF NOT EXISTS movie_data (
            movie_id                TEXT PRIMARY KEY,
            url                     TEXT NOT NULL,
            title                   TEXT NOT NULL,
            content_type            TEXT NOT NULL CHECK(content_type IN ('movie','tv')),
            release_year            INTEGER NOT NULL,
            runtime                 INTEGER NOT NULL,
            letterboxd_rating       REAL NOT NULL,
            letterboxd_rating_count INTEGER NOT NULL,
            genres                  INTEGER NOT NULL,
            country_of_origin       INTEGER NOT NULL,
            poster                  TEXT NOT NULL,
{genre_columns}            harvested_at            TEXT NOT NULL
        );
        "
    ))?;
    Ok(())
}

/// SQLite-backed queue and catalog.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = connect(path)?;
        init_schema(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl QueueSource for SqliteStore {
    fn get_pending_entries(&self) -> Result<Vec<QueueEntry>> {
        fetch_pending(&self.conn)
    }
}

impl Catalog for SqliteStore {
    fn get_known_ids(&self) -> Result<HashSet<String>> {
        fetch_known_ids(&self.conn)
    }

    fn upsert(&self, records: &[CatalogRecord]) -> Result<()> {
        upsert_movie_data(&self.conn, records)
    }

    fn delete_entries(&self, ids: &[String]) -> Result<()> {
        delete_movie_urls(&self.conn, ids)
    }

    fn mark_deprecated(&self, ids: &[String]) -> Result<()> {
        mark_movie_urls_deprecated(&self.conn, ids)
    }
}

// ── Queue ──

/// Insert queue rows, leaving existing ones (and their deprecated flag) untouched.
pub fn insert_movie_urls(conn: &Connection, entries: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO movie_urls (movie_id, url) VALUES (?1, ?2)")?;
        for (movie_id, url) in entries {
            count += stmt.execute(rusqlite::params![movie_id, url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_pending(conn: &Connection) -> Result<Vec<QueueEntry>> {
    let mut stmt = conn.prepare(
        "SELECT movie_id, url, is_deprecated FROM movie_urls
         WHERE is_deprecated = 0
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueueEntry {
                movie_id: row.get(0)?,
                url: row.get(1)?,
                is_deprecated: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub fn fetch_entry(conn: &Connection, movie_id: &str) -> Result<Option<QueueEntry>> {
    let mut stmt =
        conn.prepare("SELECT movie_id, url, is_deprecated FROM movie_urls WHERE movie_id = ?1")?;
    let mut rows = stmt.query_map([movie_id], |row| {
        Ok(QueueEntry {
            movie_id: row.get(0)?,
            url: row.get(1)?,
            is_deprecated: row.get(2)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}

pub fn delete_movie_urls(conn: &Connection, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare("DELETE FROM movie_urls WHERE movie_id = ?1")?;
        for id in ids {
            stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn mark_movie_urls_deprecated(conn: &Connection, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare("UPDATE movie_urls SET is_deprecated = 1 WHERE movie_id = ?1")?;
        for id in ids {
            stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Catalog ──

pub fn fetch_known_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT movie_id FROM movie_data")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(ids)
}

pub fn upsert_movie_data(conn: &Connection, records: &[CatalogRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let genre_cols: Vec<String> = GENRES.iter().map(|g| format!("is_{g}")).collect();
    let base_cols = [
        "movie_id",
        "url",
        "title",
        "content_type",
        "release_year",
        "runtime",
        "letterboxd_rating",
        "letterboxd_rating_count",
        "genres",
        "country_of_origin",
        "poster",
        "harvested_at",
    ];
    let columns: Vec<&str> = base_cols
        .iter()
        .copied()
        .chain(genre_cols.iter().map(String::as_str))
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    let sql = format!(
        "INSERT INTO movie_data ({}) VALUES ({})
         ON CONFLICT(movie_id) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    );

    let harvested_at = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&sql)?;
        for r in records {
            let flags = decode_genres(Some(r.genre_bitmask));
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
                Box::new(r.movie_id.clone()),
                Box::new(r.url.clone()),
                Box::new(r.title.clone()),
                Box::new(r.content_type.as_str()),
                Box::new(r.release_year),
                Box::new(r.runtime_minutes),
                Box::new(r.rating),
                Box::new(r.rating_count as i64),
                Box::new(r.genre_bitmask),
                Box::new(r.country_code),
                Box::new(r.poster_url.clone()),
                Box::new(harvested_at.clone()),
            ];
            values.extend(flags.iter().map(|f| Box::new(*f) as Box<dyn rusqlite::types::ToSql>));
            let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
            stmt.execute(refs.as_slice())?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
pub fn fetch_record(conn: &Connection, movie_id: &str) -> Result<Option<CatalogRecord>> {
    let mut stmt = conn.prepare(
        "SELECT movie_id, url, title, content_type, release_year, runtime,
                letterboxd_rating, letterboxd_rating_count, genres, country_of_origin, poster
         FROM movie_data WHERE movie_id = ?1",
    )?;
    let mut rows = stmt.query_map([movie_id], |row| {
        let content_type: String = row.get(3)?;
        Ok(CatalogRecord {
            movie_id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            content_type: if content_type == "tv" {
                crate::model::ContentType::Tv
            } else {
                crate::model::ContentType::Movie
            },
            release_year: row.get(4)?,
            runtime_minutes: row.get(5)?,
            rating: row.get(6)?,
            rating_count: row.get::<_, i64>(7)? as u64,
            genre_bitmask: row.get(8)?,
            country_code: row.get(9)?,
            poster_url: row.get(10)?,
        })
    })?;
    Ok(rows.next().transpose()?)
}

/// Per-genre boolean columns as stored for `movie_id`, in vocabulary order.
#[cfg(test)]
pub fn fetch_genre_flags(conn: &Connection, movie_id: &str) -> Result<Option<Vec<bool>>> {
    let cols: Vec<String> = GENRES.iter().map(|g| format!("is_{g}")).collect();
    let sql = format!("SELECT {} FROM movie_data WHERE movie_id = ?1", cols.join(", "));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map([movie_id], |row| {
        (0..GENRES.len()).map(|i| row.get::<_, bool>(i)).collect::<Result<Vec<_>, _>>()
    })?;
    Ok(rows.next().transpose()?)
}

// ── Stats ──

pub struct Stats {
    pub queued: usize,
    pub pending: usize,
    pub deprecated: usize,
    pub catalog: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let queued: usize = conn.query_row("SELECT COUNT(*) FROM movie_urls", [], |r| r.get(0))?;
    let deprecated: usize = conn.query_row(
        "SELECT COUNT(*) FROM movie_urls WHERE is_deprecated = 1",
        [],
        |r| r.get(0),
    )?;
    let catalog: usize = conn.query_row("SELECT COUNT(*) FROM movie_data", [], |r| r.get(0))?;
    Ok(Stats {
        queued,
        pending: queued - deprecated,
        deprecated,
        catalog,
    })
}

pub fn queue_size(conn: &Connection) -> Result<usize> {
    Ok(conn.query_row("SELECT COUNT(*) FROM movie_urls", [], |r| r.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_genres;
    use crate::model::ContentType;

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        SqliteStore::new(conn)
    }

    fn record(id: &str, genres: &[&str]) -> CatalogRecord {
        CatalogRecord {
            movie_id: id.into(),
            url: format!("/film/{id}/"),
            title: format!("Film {id}"),
            content_type: ContentType::Movie,
            release_year: 2019,
            runtime_minutes: 132,
            rating: 4.5,
            rating_count: 1_234_567,
            genre_bitmask: encode_genres(genres),
            country_code: 6,
            poster_url: "https://a.ltrbxd.com/poster.jpg".into(),
        }
    }

    fn enqueue(store: &SqliteStore, rows: &[(&str, &str)]) -> usize {
        let rows: Vec<(String, String)> =
            rows.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect();
        insert_movie_urls(store.conn(), &rows).unwrap()
    }

    #[test]
    fn schema_is_idempotent() {
        let s = store();
        init_schema(s.conn()).unwrap();
    }

    #[test]
    fn insert_ignores_existing_rows() {
        let s = store();
        assert_eq!(enqueue(&s, &[("1", "/film/a/"), ("2", "/film/b/")]), 2);
        s.mark_deprecated(&["1".into()]).unwrap();
        assert_eq!(enqueue(&s, &[("1", "/film/a/"), ("3", "/film/c/")]), 1);
        assert!(fetch_entry(s.conn(), "1").unwrap().unwrap().is_deprecated);
    }

    #[test]
    fn pending_excludes_deprecated_in_queue_order() {
        let s = store();
        enqueue(&s, &[("3", "/film/c/"), ("1", "/film/a/"), ("2", "/film/b/")]);
        s.mark_deprecated(&["1".into()]).unwrap();
        let ids: Vec<String> = s
            .get_pending_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.movie_id)
            .collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[test]
    fn upsert_overwrites_and_materializes_genre_columns() {
        let s = store();
        s.upsert(&[record("1", &["Drama", "Thriller"])]).unwrap();
        s.upsert(&[record("1", &["Comedy"])]).unwrap();

        let stored = fetch_record(s.conn(), "1").unwrap().unwrap();
        assert_eq!(stored, record("1", &["Comedy"]));

        let flags = fetch_genre_flags(s.conn(), "1").unwrap().unwrap();
        let set: Vec<&str> = GENRES
            .iter()
            .zip(flags)
            .filter_map(|(g, f)| f.then_some(*g))
            .collect();
        assert_eq!(set, vec!["comedy"]);
        assert_eq!(s.get_known_ids().unwrap().len(), 1);
    }

    #[test]
    fn delete_and_deprecate_are_idempotent() {
        let s = store();
        enqueue(&s, &[("1", "/film/a/"), ("2", "/film/b/")]);
        let one = vec!["1".to_string()];
        let two = vec!["2".to_string()];

        s.delete_entries(&one).unwrap();
        s.delete_entries(&one).unwrap();
        s.mark_deprecated(&two).unwrap();
        s.mark_deprecated(&two).unwrap();

        assert!(fetch_entry(s.conn(), "1").unwrap().is_none());
        assert!(fetch_entry(s.conn(), "2").unwrap().unwrap().is_deprecated);

        let stats = get_stats(s.conn()).unwrap();
        assert_eq!((stats.queued, stats.pending, stats.deprecated), (1, 0, 1));
    }

    #[test]
    fn empty_writes_are_no_ops() {
        let s = store();
        s.upsert(&[]).unwrap();
        s.delete_entries(&[]).unwrap();
        s.mark_deprecated(&[]).unwrap();
        assert_eq!(get_stats(s.conn()).unwrap().catalog, 0);
    }
}
