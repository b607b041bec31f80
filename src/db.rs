use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS listing_rows (
            id              INTEGER PRIMARY KEY,
            job_id          INTEGER NOT NULL,
            load_date       TEXT NOT NULL,
            title           TEXT NOT NULL,
            link            TEXT NOT NULL,
            date_added      TEXT NOT NULL,
            salary_l        TEXT,
            salary_h        TEXT,
            salary_currency TEXT NOT NULL,
            company         TEXT NOT NULL,
            city            TEXT NOT NULL,
            district        TEXT NOT NULL,
            work_from_home  TEXT NOT NULL,
            response_period TEXT NOT NULL,
            rating          TEXT NOT NULL,
            other_details   TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_listing_rows_date ON listing_rows(load_date);

        CREATE TABLE IF NOT EXISTS detail_backup (
            id               INTEGER PRIMARY KEY,
            run_id           TEXT NOT NULL,
            load_date        TEXT NOT NULL,
            job_id           INTEGER NOT NULL,
            introduction     TEXT,
            job_descriptions TEXT,
            created_at       TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_detail_backup_date ON detail_backup(load_date);

        -- Canonical, query-ready job offers
        CREATE TABLE IF NOT EXISTS jobcz_details (
            job_id              INTEGER PRIMARY KEY,
            job_offer           TEXT NOT NULL,
            job_offer_embedding TEXT,
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS jobcz_details_embedded (
            id        INTEGER PRIMARY KEY,
            text      TEXT NOT NULL,
            embedding TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS requests (
            id         INTEGER PRIMARY KEY,
            job_type   TEXT NOT NULL,
            date       TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date   TEXT,
            status     INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_requests_lookup ON requests(job_type, date, status);
        ",
    )?;
    Ok(())
}

// ── Records ──

/// One job card from a search-results page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub id: i64,
    pub load_date: String,
    pub title: String,
    pub link: String,
    pub date_added: String,
    pub salary_l: String,
    pub salary_h: String,
    pub salary_currency: String,
    pub company: String,
    pub city: String,
    pub district: String,
    pub work_from_home: String,
    pub response_period: String,
    pub rating: String,
    pub other_details: String,
}

/// One job-detail page. `id == 0` marks a page whose id could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetail {
    pub id: i64,
    pub introduction: String,
    pub job_descriptions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub job_id: i64,
    pub job_offer: String,
}

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

// ── Listing table ──

pub fn insert_listings(conn: &Connection, rows: &[RawListing]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO listing_rows (
                job_id, load_date, title, link, date_added, salary_l, salary_h,
                salary_currency, company, city, district, work_from_home,
                response_period, rating, other_details
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;
        for row in rows {
            count += stmt.execute(rusqlite::params![
                row.id,
                row.load_date,
                row.title,
                row.link,
                row.date_added,
                row.salary_l,
                row.salary_h,
                row.salary_currency,
                row.company,
                row.city,
                row.district,
                row.work_from_home,
                row.response_period,
                row.rating,
                row.other_details,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// All listing rows accumulated for `load_date`, in insertion order.
pub fn fetch_listings(conn: &Connection, load_date: &str) -> Result<Vec<RawListing>> {
    let mut stmt = conn.prepare(
        "SELECT job_id, load_date, title, link, date_added, salary_l, salary_h,
                salary_currency, company, city, district, work_from_home,
                response_period, rating, other_details
         FROM listing_rows WHERE load_date = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([load_date], |row| {
            Ok(RawListing {
                id: row.get(0)?,
                load_date: row.get(1)?,
                title: row.get(2)?,
                link: row.get(3)?,
                date_added: row.get(4)?,
                salary_l: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                salary_h: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                salary_currency: row.get(7)?,
                company: row.get(8)?,
                city: row.get(9)?,
                district: row.get(10)?,
                work_from_home: row.get(11)?,
                response_period: row.get(12)?,
                rating: row.get(13)?,
                other_details: row.get(14)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Detail table ──

pub fn insert_details(
    conn: &Connection,
    run_id: &str,
    load_date: &str,
    rows: &[RawDetail],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO detail_backup (run_id, load_date, job_id, introduction, job_descriptions)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in rows {
            count += stmt.execute(rusqlite::params![
                run_id,
                load_date,
                row.id,
                row.introduction,
                row.job_descriptions,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Backed-up detail rows of the most recent run for `load_date`, in fetch order.
pub fn fetch_backup_details(conn: &Connection, load_date: &str) -> Result<Vec<RawDetail>> {
    let mut stmt = conn.prepare(
        "SELECT job_id, introduction, job_descriptions
         FROM detail_backup
         WHERE load_date = ?1
           AND run_id = (
               SELECT run_id FROM detail_backup
               WHERE load_date = ?1 ORDER BY id DESC LIMIT 1
           )
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([load_date], |row| {
            Ok(RawDetail {
                id: row.get(0)?,
                introduction: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                job_descriptions: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Job offers ──

/// Insert new offers and replace the text of existing ones, all or nothing.
pub fn upsert_job_offers(conn: &Connection, records: &[CanonicalRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO jobcz_details (job_id, job_offer) VALUES (?1, ?2)
             ON CONFLICT(job_id) DO UPDATE SET
                job_offer = excluded.job_offer,
                updated_at = datetime('now')",
        )?;
        for record in records {
            count += stmt.execute(rusqlite::params![record.job_id, record.job_offer])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_job_offers(conn: &Connection) -> Result<Vec<CanonicalRecord>> {
    let mut stmt = conn.prepare("SELECT job_id, job_offer FROM jobcz_details ORDER BY job_id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CanonicalRecord {
                job_id: row.get(0)?,
                job_offer: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_offer_embedding(conn: &Connection, job_id: i64, embedding: &[f32]) -> Result<bool> {
    let encoded = serde_json::to_string(embedding)?;
    let n = conn.execute(
        "UPDATE jobcz_details SET job_offer_embedding = ?1 WHERE job_id = ?2",
        rusqlite::params![encoded, job_id],
    )?;
    Ok(n > 0)
}

pub fn fetch_offer_embedding(conn: &Connection, job_id: i64) -> Result<Option<Vec<f32>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT job_offer_embedding FROM jobcz_details WHERE job_id = ?1",
            [job_id],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    raw.map(|s| serde_json::from_str(&s).context("Corrupt embedding"))
        .transpose()
}

// ── Chunks ──

/// Drop every stored chunk and write `chunks` in their place.
pub fn replace_chunks(conn: &Connection, chunks: &[(String, Vec<f32>)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM jobcz_details_embedded", [])?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT INTO jobcz_details_embedded (text, embedding) VALUES (?1, ?2)")?;
        for (text, embedding) in chunks {
            let encoded = serde_json::to_string(embedding)?;
            count += stmt.execute(rusqlite::params![text, encoded])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_chunks(conn: &Connection) -> Result<Vec<StoredChunk>> {
    let mut stmt = conn.prepare("SELECT id, text, embedding FROM jobcz_details_embedded ORDER BY id")?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, text, embedding)| -> Result<StoredChunk> {
            let embedding = serde_json::from_str(&embedding)
                .with_context(|| format!("Corrupt embedding on chunk {}", id))?;
            Ok(StoredChunk { id, text, embedding })
        })
        .collect()
}
