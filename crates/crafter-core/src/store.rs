//! Durable run store on sqlite. One row per crafter with the work ledger
//! in its line-record text form, one singleton authority row, and an
//! append-only event table. Saves are transactional; a crash between
//! saves loses at most the delta since the last one.

use std::fmt;
use std::path::Path;

use contracts::{CrafterConfig, CreatureId, ForgeId, WorkEvent};
use rusqlite::{params, Connection, OptionalExtension};

use crate::world::CrafterSnapshot;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    /// A crafter row holds a skill label no longer recognized.
    UnknownSkill(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::UnknownSkill(label) => write!(f, "unknown skill label '{label}'"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// The singleton authority row: currency sinks plus the tick cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthorityState {
    pub tax_balance: i64,
    pub upkeep_consumed: i64,
    pub current_tick: u64,
}

#[derive(Debug)]
pub struct SqliteWorkStore {
    conn: Connection,
}

impl SqliteWorkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// Persist one save point: config, authority row, every crafter row,
    /// and the events drained since the last save. All or nothing.
    pub fn persist_state(
        &mut self,
        config: &CrafterConfig,
        authority: AuthorityState,
        snapshots: &[CrafterSnapshot],
        events: &[WorkEvent],
    ) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(config)?;
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO config (id, payload_json, updated_tick)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                payload_json = excluded.payload_json,
                updated_tick = excluded.updated_tick",
            params![
                config_json,
                i64::try_from(authority.current_tick).unwrap_or(i64::MAX)
            ],
        )?;

        tx.execute(
            "INSERT INTO authority (id, tax_balance, upkeep_consumed, current_tick)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                tax_balance = excluded.tax_balance,
                upkeep_consumed = excluded.upkeep_consumed,
                current_tick = excluded.current_tick",
            params![
                authority.tax_balance,
                authority.upkeep_consumed,
                i64::try_from(authority.current_tick).unwrap_or(i64::MAX)
            ],
        )?;

        for snapshot in snapshots {
            tx.execute(
                "INSERT INTO crafters (
                    crafter_id,
                    name,
                    skill,
                    skill_level,
                    owner_id,
                    balance,
                    forge_id,
                    workbook_text,
                    updated_tick
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(crafter_id) DO UPDATE SET
                    name = excluded.name,
                    skill = excluded.skill,
                    skill_level = excluded.skill_level,
                    owner_id = excluded.owner_id,
                    balance = excluded.balance,
                    forge_id = excluded.forge_id,
                    workbook_text = excluded.workbook_text,
                    updated_tick = excluded.updated_tick",
                params![
                    i64::try_from(snapshot.id).unwrap_or(i64::MAX),
                    snapshot.name,
                    snapshot.skill.to_string(),
                    f64::from(snapshot.skill_level),
                    i64::try_from(snapshot.owner).unwrap_or(i64::MAX),
                    snapshot.balance,
                    snapshot
                        .forge
                        .map(|forge| i64::try_from(forge).unwrap_or(i64::MAX)),
                    snapshot.workbook_text,
                    i64::try_from(authority.current_tick).unwrap_or(i64::MAX),
                ],
            )?;
        }

        for event in events {
            let payload_json = serde_json::to_string(event)?;
            let kind_label = serde_json::to_string(&event.kind)?
                .trim_matches('"')
                .to_string();
            tx.execute(
                "INSERT INTO events (tick, crafter_id, kind, payload_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    i64::try_from(event.tick).unwrap_or(i64::MAX),
                    i64::try_from(event.crafter).unwrap_or(i64::MAX),
                    kind_label,
                    payload_json,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Drop the row for a destroyed crafter. Its events are kept.
    pub fn delete_crafter(&mut self, id: CreatureId) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM crafters WHERE crafter_id = ?1",
            params![i64::try_from(id).unwrap_or(i64::MAX)],
        )?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<Option<CrafterConfig>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload_json FROM config WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn load_authority(&self) -> Result<Option<AuthorityState>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT tax_balance, upkeep_consumed, current_tick FROM authority WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(tax_balance, upkeep_consumed, tick)| AuthorityState {
            tax_balance,
            upkeep_consumed,
            current_tick: u64::try_from(tick).unwrap_or(0),
        }))
    }

    /// Every persisted crafter, id order.
    pub fn load_snapshots(&self) -> Result<Vec<CrafterSnapshot>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT crafter_id, name, skill, skill_level, owner_id, balance, forge_id, workbook_text
             FROM crafters
             ORDER BY crafter_id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (id, name, skill_label, skill_level, owner, balance, forge, workbook_text) = row?;
            let skill = contracts::SkillType::parse(&skill_label)
                .ok_or_else(|| StoreError::UnknownSkill(skill_label.clone()))?;
            snapshots.push(CrafterSnapshot {
                id: u64::try_from(id).unwrap_or(0),
                name,
                skill,
                skill_level: skill_level as f32,
                owner: u64::try_from(owner).unwrap_or(0),
                balance,
                forge: forge.map(|forge| ForgeId::try_from(forge).unwrap_or(0)),
                workbook_text,
            });
        }

        Ok(snapshots)
    }

    pub fn load_events_range(
        &self,
        from_tick: u64,
        to_tick: u64,
    ) -> Result<Vec<WorkEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT payload_json
             FROM events
             WHERE tick >= ?1 AND tick <= ?2
             ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(
            params![
                i64::try_from(from_tick).unwrap_or(i64::MAX),
                i64::try_from(to_tick).unwrap_or(i64::MAX)
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut events = Vec::new();
        for row in rows {
            let payload = row?;
            events.push(serde_json::from_str::<WorkEvent>(&payload)?);
        }

        Ok(events)
    }

    fn configure(&mut self) -> Result<(), StoreError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload_json TEXT NOT NULL,
                updated_tick INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS authority (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                tax_balance INTEGER NOT NULL,
                upkeep_consumed INTEGER NOT NULL,
                current_tick INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS crafters (
                crafter_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                skill TEXT NOT NULL,
                skill_level REAL NOT NULL,
                owner_id INTEGER NOT NULL,
                balance INTEGER NOT NULL,
                forge_id INTEGER,
                workbook_text TEXT NOT NULL,
                updated_tick INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                tick INTEGER NOT NULL,
                crafter_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_tick ON events(tick);
            CREATE INDEX IF NOT EXISTS idx_events_crafter_tick ON events(crafter_id, tick);
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'initial_v1', 'tick-000000')",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SkillType, WorkEventKind};

    fn snapshot(id: CreatureId) -> CrafterSnapshot {
        CrafterSnapshot {
            id,
            name: format!("crafter-{id}"),
            skill: SkillType::Weaponsmithing,
            skill_level: 20.0,
            owner: 500,
            balance: 226,
            forge: Some(77),
            workbook_text: "101,202,70,1,250,0\n314\n".to_string(),
        }
    }

    #[test]
    fn save_then_load_round_trips_crafter_rows() {
        let mut store = SqliteWorkStore::open_in_memory().expect("open");
        let config = CrafterConfig::default();
        let authority = AuthorityState {
            tax_balance: 40,
            upkeep_consumed: 75,
            current_tick: 12,
        };
        store
            .persist_state(&config, authority, &[snapshot(100), snapshot(101)], &[])
            .expect("persist");

        let loaded = store.load_snapshots().expect("load");
        assert_eq!(loaded, vec![snapshot(100), snapshot(101)]);
        assert_eq!(store.load_authority().expect("authority"), Some(authority));
        assert_eq!(store.load_config().expect("config"), Some(config));
    }

    #[test]
    fn second_save_upserts_instead_of_duplicating() {
        let mut store = SqliteWorkStore::open_in_memory().expect("open");
        let config = CrafterConfig::default();
        let mut snap = snapshot(100);
        store
            .persist_state(&config, AuthorityState::default(), &[snap.clone()], &[])
            .expect("first save");
        snap.balance = 999;
        snap.workbook_text = "314\n".to_string();
        store
            .persist_state(&config, AuthorityState::default(), &[snap.clone()], &[])
            .expect("second save");

        let loaded = store.load_snapshots().expect("load");
        assert_eq!(loaded, vec![snap]);
    }

    #[test]
    fn delete_crafter_removes_only_that_row() {
        let mut store = SqliteWorkStore::open_in_memory().expect("open");
        let config = CrafterConfig::default();
        store
            .persist_state(
                &config,
                AuthorityState::default(),
                &[snapshot(100), snapshot(101)],
                &[],
            )
            .expect("persist");
        store.delete_crafter(100).expect("delete");
        let loaded = store.load_snapshots().expect("load");
        assert_eq!(loaded, vec![snapshot(101)]);
    }

    #[test]
    fn events_persist_in_append_order() {
        let mut store = SqliteWorkStore::open_in_memory().expect("open");
        let config = CrafterConfig::default();
        let events = vec![
            WorkEvent::with_detail(1, 100, WorkEventKind::OrderSubmitted, "item=1"),
            WorkEvent::with_detail(2, 100, WorkEventKind::JobCompleted, "item=1"),
            WorkEvent::with_detail(2, 100, WorkEventKind::JobMailed, "item=1"),
        ];
        store
            .persist_state(&config, AuthorityState::default(), &[], &events)
            .expect("persist");

        let loaded = store.load_events_range(0, 10).expect("load");
        assert_eq!(loaded, events);
        let later = store.load_events_range(2, 10).expect("load range");
        assert_eq!(later.len(), 2);
    }

    #[test]
    fn fresh_store_loads_empty() {
        let store = SqliteWorkStore::open_in_memory().expect("open");
        assert!(store.load_snapshots().expect("snapshots").is_empty());
        assert!(store.load_config().expect("config").is_none());
        assert!(store.load_authority().expect("authority").is_none());
    }
}
