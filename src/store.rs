//! SQLite store for punters, tips, and bets
//!
//! Owns the schema and all reads/writes. The one invariant protected here is
//! that no two bets may share a (punter, tip) pair; the bets table carries a
//! UNIQUE constraint and inserts go through a conflict-aware statement, so the
//! duplicate check and the insert are a single serialized operation.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// A subscriber on the tip roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Punter {
    pub id: i64,
    pub first_name: String,
    pub surname: String,
    pub phone_number: String,
}

/// Win or each-way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetType {
    #[serde(rename = "win")]
    Win,
    #[serde(rename = "e/w")]
    EachWay,
}

impl BetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::Win => crate::config::BET_TYPE_WIN,
            BetType::EachWay => crate::config::BET_TYPE_EACH_WAY,
        }
    }
}

impl std::fmt::Display for BetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            crate::config::BET_TYPE_WIN => Ok(BetType::Win),
            crate::config::BET_TYPE_EACH_WAY => Ok(BetType::EachWay),
            other => Err(crate::Error::Parse(format!("unknown bet type: {}", other))),
        }
    }
}

impl ToSql for BetType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for BetType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| s.parse().map_err(|e| FromSqlError::Other(Box::new(e))))
    }
}

/// A published betting tip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub id: i64,
    pub horse: String,
    pub time: String,
    pub meeting: String,
    pub bet_type: BetType,
    pub min_price: String,
    pub stake: String,
    pub created_at: DateTime<Utc>,
}

/// A recorded bet confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: i64,
    pub punter_id: i64,
    pub tip_id: i64,
    pub stake: String,
    pub price: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a conflict-aware bet insert
#[derive(Debug, Clone, PartialEq)]
pub enum BetInsert {
    Recorded(Bet),
    /// A bet for this (punter, tip) pair already exists; nothing was written
    AlreadyRecorded,
}

/// SQLite-backed store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // Queue concurrent writers instead of failing fast
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS punters (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name   TEXT NOT NULL,
                surname      TEXT NOT NULL,
                phone_number TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS tips (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                horse      TEXT NOT NULL,
                time       TEXT NOT NULL,
                meeting    TEXT NOT NULL,
                bet_type   TEXT NOT NULL,
                min_price  TEXT NOT NULL,
                stake      TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS bets (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                punter_id  INTEGER NOT NULL REFERENCES punters(id),
                tip_id     INTEGER NOT NULL REFERENCES tips(id),
                stake      TEXT NOT NULL,
                price      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (punter_id, tip_id)
            );

            CREATE TABLE IF NOT EXISTS inbound (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                sender      TEXT NOT NULL,
                body        TEXT NOT NULL,
                received_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Punters (subscriber directory)
    // ------------------------------------------------------------------

    /// Add a punter to the roster; the phone number is stored normalized
    pub fn add_punter(&self, first_name: &str, surname: &str, phone: &str) -> Result<Punter> {
        let normalized = normalize_phone(phone);
        self.conn.execute(
            "INSERT INTO punters (first_name, surname, phone_number) VALUES (?1, ?2, ?3)",
            rusqlite::params![first_name, surname, normalized],
        )?;

        Ok(Punter {
            id: self.conn.last_insert_rowid(),
            first_name: first_name.to_string(),
            surname: surname.to_string(),
            phone_number: normalized,
        })
    }

    /// Look up a punter by phone number (normalized before matching)
    pub fn punter_by_phone(&self, phone: &str) -> Result<Option<Punter>> {
        let normalized = normalize_phone(phone);
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, surname, phone_number FROM punters WHERE phone_number = ?1",
        )?;

        let mut rows = stmt.query_map([normalized], row_to_punter)?;
        match rows.next() {
            Some(punter) => Ok(Some(punter?)),
            None => Ok(None),
        }
    }

    /// All punters, in roster order
    pub fn punters(&self) -> Result<Vec<Punter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, surname, phone_number FROM punters ORDER BY id",
        )?;
        let punters = stmt
            .query_map([], row_to_punter)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(punters)
    }

    // ------------------------------------------------------------------
    // Tips (tip ledger)
    // ------------------------------------------------------------------

    pub fn add_tip(
        &self,
        horse: &str,
        time: &str,
        meeting: &str,
        bet_type: BetType,
        min_price: &str,
        stake: &str,
    ) -> Result<Tip> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO tips (horse, time, meeting, bet_type, min_price, stake, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![horse, time, meeting, bet_type, min_price, stake, now.to_rfc3339()],
        )?;

        Ok(Tip {
            id: self.conn.last_insert_rowid(),
            horse: horse.to_string(),
            time: time.to_string(),
            meeting: meeting.to_string(),
            bet_type,
            min_price: min_price.to_string(),
            stake: stake.to_string(),
            created_at: now,
        })
    }

    /// The active tip, by convention the most recently created one (highest
    /// id). Tips are never closed or superseded other than by recency.
    pub fn latest_tip(&self) -> Result<Option<Tip>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, horse, time, meeting, bet_type, min_price, stake, created_at
             FROM tips ORDER BY id DESC LIMIT 1",
        )?;

        let mut rows = stmt.query_map([], row_to_tip)?;
        match rows.next() {
            Some(tip) => Ok(Some(tip?)),
            None => Ok(None),
        }
    }

    /// All tips, oldest first
    pub fn tips(&self) -> Result<Vec<Tip>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, horse, time, meeting, bet_type, min_price, stake, created_at
             FROM tips ORDER BY id",
        )?;
        let tips = stmt
            .query_map([], row_to_tip)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tips)
    }

    // ------------------------------------------------------------------
    // Bets
    // ------------------------------------------------------------------

    /// Record a bet, at most once per (punter, tip) pair.
    ///
    /// The insert is conflict-aware: if a bet already exists for the pair the
    /// statement changes nothing and `AlreadyRecorded` is returned. This is
    /// what keeps two concurrent identical replies from both landing.
    pub fn record_bet(
        &self,
        punter_id: i64,
        tip_id: i64,
        stake: &str,
        price: &str,
    ) -> Result<BetInsert> {
        let now = Utc::now();
        let changed = self.conn.execute(
            "INSERT INTO bets (punter_id, tip_id, stake, price, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (punter_id, tip_id) DO NOTHING",
            rusqlite::params![punter_id, tip_id, stake, price, now.to_rfc3339()],
        )?;

        if changed == 0 {
            return Ok(BetInsert::AlreadyRecorded);
        }

        Ok(BetInsert::Recorded(Bet {
            id: self.conn.last_insert_rowid(),
            punter_id,
            tip_id,
            stake: stake.to_string(),
            price: price.to_string(),
            created_at: now,
        }))
    }

    /// The bet (if any) a punter has recorded against a specific tip
    pub fn bet_for(&self, punter_id: i64, tip_id: i64) -> Result<Option<Bet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, punter_id, tip_id, stake, price, created_at
             FROM bets WHERE punter_id = ?1 AND tip_id = ?2",
        )?;

        let mut rows = stmt.query_map([punter_id, tip_id], row_to_bet)?;
        match rows.next() {
            Some(bet) => Ok(Some(bet?)),
            None => Ok(None),
        }
    }

    /// All bets a punter has recorded, oldest first
    pub fn bets_for_punter(&self, punter_id: i64) -> Result<Vec<Bet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, punter_id, tip_id, stake, price, created_at
             FROM bets WHERE punter_id = ?1 ORDER BY id",
        )?;
        let bets = stmt
            .query_map([punter_id], row_to_bet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bets)
    }

    /// All bets, oldest first
    pub fn bets(&self) -> Result<Vec<Bet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, punter_id, tip_id, stake, price, created_at FROM bets ORDER BY id",
        )?;
        let bets = stmt
            .query_map([], row_to_bet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bets)
    }

    // ------------------------------------------------------------------
    // Inbound spool
    // ------------------------------------------------------------------

    /// Append an inbound message to the spool (what the SMS gateway does)
    pub fn append_inbound(&self, sender: &str, body: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO inbound (sender, body, received_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![sender, body, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

fn row_to_punter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Punter> {
    Ok(Punter {
        id: row.get(0)?,
        first_name: row.get(1)?,
        surname: row.get(2)?,
        phone_number: row.get(3)?,
    })
}

fn row_to_tip(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tip> {
    Ok(Tip {
        id: row.get(0)?,
        horse: row.get(1)?,
        time: row.get(2)?,
        meeting: row.get(3)?,
        bet_type: row.get(4)?,
        min_price: row.get(5)?,
        stake: row.get(6)?,
        created_at: parse_timestamp(row, 7)?,
    })
}

fn row_to_bet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bet> {
    Ok(Bet {
        id: row.get(0)?,
        punter_id: row.get(1)?,
        tip_id: row.get(2)?,
        stake: row.get(3)?,
        price: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
    })
}

pub(crate) fn parse_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Normalize a phone number to E.164 (UK-flavoured roster)
pub fn normalize_phone(phone: &str) -> String {
    let has_plus = phone.starts_with('+');
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if has_plus {
        format!("+{}", digits)
    } else if digits.len() == 11 && digits.starts_with('0') {
        // Domestic format, e.g. 07700 900123
        format!("+44{}", &digits[1..])
    } else {
        format!("+{}", digits)
    }
}
