//! SQLite persistence layer.
//!
//! Implements the vault store and recovery metrics sink on a single SQLite
//! database. Vault creation and check-ins run in one transaction each;
//! vault updates are guarded by the row's `version` column.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use vigil_inherit::party::{PartyRole, PartyStatus};
use vigil_inherit::vault::Attestation;
use vigil_inherit::{
    CheckIn, Fragment, NewVault, Party, RecoveryAttempt, RecoveryMetrics, Scheme, StoreError, Vault,
    VaultId, VaultStatus, VaultStore,
};

/// Open (or create) the database at `path` and run migrations.
pub fn open_db(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;

    // WAL mode for better concurrent read performance
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // Run migrations
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vaults (
            id                     TEXT PRIMARY KEY,
            owner                  TEXT NOT NULL,
            check_in_interval_days INTEGER NOT NULL,
            grace_period_days      INTEGER NOT NULL,
            status                 TEXT NOT NULL,
            last_check_in_at       TEXT NOT NULL,
            next_check_in_due      TEXT NOT NULL,
            fragment_scheme        TEXT,
            triggered_at           TEXT,
            trigger_cycle          INTEGER NOT NULL DEFAULT 0,
            attestations           TEXT NOT NULL DEFAULT '[]',
            claimed_by             TEXT,
            claimed_at             TEXT,
            created_at             TEXT NOT NULL,
            version                INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS parties (
            id                TEXT PRIMARY KEY,
            vault_id          TEXT NOT NULL REFERENCES vaults(id),
            role              TEXT NOT NULL,
            name              TEXT NOT NULL,
            email             TEXT NOT NULL,
            phone             TEXT,
            invite_token      TEXT NOT NULL UNIQUE,
            invite_expires_at TEXT NOT NULL,
            status            TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_parties_vault ON parties(vault_id);

        CREATE TABLE IF NOT EXISTS fragments (
            vault_id        TEXT NOT NULL REFERENCES vaults(id),
            guardian_id     TEXT NOT NULL REFERENCES parties(id),
            fragment_index  INTEGER NOT NULL,
            encrypted_data  TEXT NOT NULL,
            derivation_salt TEXT NOT NULL,
            PRIMARY KEY (vault_id, fragment_index)
        );

        CREATE TABLE IF NOT EXISTS check_ins (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            vault_id      TEXT NOT NULL REFERENCES vaults(id),
            signature     TEXT NOT NULL,
            message       TEXT,
            ip_address    TEXT,
            checked_in_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recovery_attempts (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            vault_id           TEXT,
            scheme             TEXT NOT NULL,
            fragments_provided INTEGER NOT NULL,
            threshold          INTEGER NOT NULL,
            success            INTEGER NOT NULL,
            error_type         TEXT,
            attempted_at       TEXT NOT NULL
        );
        ",
    )?;

    Ok(conn)
}

// ============================================================================
// Conversions
// ============================================================================

fn sql(e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Duplicate(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s:?}: {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_id(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("id {s:?}: {e}")))
}

/// Raw `vaults` row, converted outside the rusqlite closure
struct VaultRow {
    id: String,
    owner: String,
    check_in_interval_days: u32,
    grace_period_days: u32,
    status: String,
    last_check_in_at: String,
    next_check_in_due: String,
    fragment_scheme: Option<String>,
    triggered_at: Option<String>,
    trigger_cycle: u32,
    attestations: String,
    claimed_by: Option<String>,
    claimed_at: Option<String>,
    created_at: String,
    version: i64,
}

const VAULT_COLUMNS: &str = "id, owner, check_in_interval_days, grace_period_days, status,
    last_check_in_at, next_check_in_due, fragment_scheme, triggered_at, trigger_cycle,
    attestations, claimed_by, claimed_at, created_at, version";

impl VaultRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            check_in_interval_days: row.get(2)?,
            grace_period_days: row.get(3)?,
            status: row.get(4)?,
            last_check_in_at: row.get(5)?,
            next_check_in_due: row.get(6)?,
            fragment_scheme: row.get(7)?,
            triggered_at: row.get(8)?,
            trigger_cycle: row.get(9)?,
            attestations: row.get(10)?,
            claimed_by: row.get(11)?,
            claimed_at: row.get(12)?,
            created_at: row.get(13)?,
            version: row.get(14)?,
        })
    }

    fn into_vault(self) -> Result<Vault, StoreError> {
        let attestations: Vec<Attestation> = serde_json::from_str(&self.attestations)
            .map_err(|e| StoreError::Corrupt(format!("attestations: {e}")))?;
        Ok(Vault {
            id: parse_id(&self.id)?,
            owner: self.owner,
            check_in_interval_days: self.check_in_interval_days,
            grace_period_days: self.grace_period_days,
            status: self.status.parse::<VaultStatus>().map_err(StoreError::Corrupt)?,
            last_check_in_at: parse_ts(&self.last_check_in_at)?,
            next_check_in_due: parse_ts(&self.next_check_in_due)?,
            fragment_scheme: self
                .fragment_scheme
                .map(|s| s.parse::<Scheme>())
                .transpose()
                .map_err(StoreError::Corrupt)?,
            triggered_at: parse_opt_ts(self.triggered_at)?,
            trigger_cycle: self.trigger_cycle,
            attestations,
            claimed_by: self.claimed_by.as_deref().map(parse_id).transpose()?,
            claimed_at: parse_opt_ts(self.claimed_at)?,
            created_at: parse_ts(&self.created_at)?,
            version: self.version as u64,
        })
    }
}

struct PartyRow {
    id: String,
    vault_id: String,
    role: String,
    name: String,
    email: String,
    phone: Option<String>,
    invite_token: String,
    invite_expires_at: String,
    status: String,
}

const PARTY_COLUMNS: &str =
    "id, vault_id, role, name, email, phone, invite_token, invite_expires_at, status";

impl PartyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            vault_id: row.get(1)?,
            role: row.get(2)?,
            name: row.get(3)?,
            email: row.get(4)?,
            phone: row.get(5)?,
            invite_token: row.get(6)?,
            invite_expires_at: row.get(7)?,
            status: row.get(8)?,
        })
    }

    fn into_party(self) -> Result<Party, StoreError> {
        Ok(Party {
            id: parse_id(&self.id)?,
            vault_id: parse_id(&self.vault_id)?,
            role: PartyRole::parse(&self.role)
                .ok_or_else(|| StoreError::Corrupt(format!("party role {:?}", self.role)))?,
            name: self.name,
            email: self.email,
            phone: self.phone,
            invite_token: self.invite_token,
            invite_expires_at: parse_ts(&self.invite_expires_at)?,
            status: PartyStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Corrupt(format!("party status {:?}", self.status)))?,
        })
    }
}

fn insert_vault(conn: &Connection, vault: &Vault) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO vaults ({VAULT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            vault.id.to_string(),
            vault.owner,
            vault.check_in_interval_days,
            vault.grace_period_days,
            vault.status.as_str(),
            ts(&vault.last_check_in_at),
            ts(&vault.next_check_in_due),
            vault.fragment_scheme.map(|s| s.as_str()),
            vault.triggered_at.as_ref().map(ts),
            vault.trigger_cycle,
            attestations_json(vault),
            vault.claimed_by.map(|id| id.to_string()),
            vault.claimed_at.as_ref().map(ts),
            ts(&vault.created_at),
            vault.version as i64,
        ],
    )?;
    Ok(())
}

fn attestations_json(vault: &Vault) -> String {
    // Vec of plain structs; serialization cannot fail
    serde_json::to_string(&vault.attestations).unwrap_or_else(|_| "[]".into())
}

/// Compare-and-swap a vault row on its version
fn update_vault_row(conn: &Connection, vault: &Vault, expected: u64) -> Result<u64, StoreError> {
    let next = expected + 1;
    let changed = conn
        .execute(
            "UPDATE vaults SET
                owner = ?2, check_in_interval_days = ?3, grace_period_days = ?4,
                status = ?5, last_check_in_at = ?6, next_check_in_due = ?7,
                fragment_scheme = ?8, triggered_at = ?9, trigger_cycle = ?10,
                attestations = ?11, claimed_by = ?12, claimed_at = ?13, version = ?14
             WHERE id = ?1 AND version = ?15",
            params![
                vault.id.to_string(),
                vault.owner,
                vault.check_in_interval_days,
                vault.grace_period_days,
                vault.status.as_str(),
                ts(&vault.last_check_in_at),
                ts(&vault.next_check_in_due),
                vault.fragment_scheme.map(|s| s.as_str()),
                vault.triggered_at.as_ref().map(ts),
                vault.trigger_cycle,
                attestations_json(vault),
                vault.claimed_by.map(|id| id.to_string()),
                vault.claimed_at.as_ref().map(ts),
                next as i64,
                expected as i64,
            ],
        )
        .map_err(sql)?;

    if changed == 1 {
        return Ok(next);
    }

    let found: Option<i64> = conn
        .query_row(
            "SELECT version FROM vaults WHERE id = ?1",
            params![vault.id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql)?;
    match found {
        Some(found) => Err(StoreError::VersionConflict {
            expected,
            found: found as u64,
        }),
        None => Err(StoreError::NotFound(format!("vault {}", vault.id))),
    }
}

fn insert_check_in(conn: &Connection, check_in: &CheckIn) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO check_ins (vault_id, signature, message, ip_address, checked_in_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            check_in.vault_id.to_string(),
            check_in.signature,
            check_in.message,
            check_in.ip_address,
            ts(&check_in.checked_in_at),
        ],
    )?;
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

/// Vault store on a SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = open_db(path).map_err(sql)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("database lock poisoned".into()))
    }

    fn query_vaults(&self, where_clause: &str, id: Option<String>) -> Result<Vec<Vault>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {VAULT_COLUMNS} FROM vaults {where_clause}"))
            .map_err(sql)?;
        let rows = match id {
            Some(id) => stmt.query_map(params![id], VaultRow::from_row),
            None => stmt.query_map([], VaultRow::from_row),
        }
        .map_err(sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql)?;
        rows.into_iter().map(VaultRow::into_vault).collect()
    }

    fn query_parties(&self, where_clause: &str, value: String) -> Result<Vec<Party>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {PARTY_COLUMNS} FROM parties {where_clause}"))
            .map_err(sql)?;
        let rows = stmt
            .query_map(params![value], PartyRow::from_row)
            .map_err(sql)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(sql)?;
        rows.into_iter().map(PartyRow::into_party).collect()
    }

    /// Recorded recovery attempts, oldest first
    pub fn recovery_attempts(&self) -> Result<Vec<RecoveryAttempt>, StoreError> {
        type Raw = (Option<String>, String, i64, u8, bool, Option<String>, String);
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT vault_id, scheme, fragments_provided, threshold, success, error_type,
                        attempted_at
                 FROM recovery_attempts ORDER BY id",
            )
            .map_err(sql)?;
        let rows: Vec<Raw> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })
            .map_err(sql)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql)?;

        rows.into_iter()
            .map(
                |(vault_id, scheme, provided, threshold, success, error_type, at)| {
                    Ok(RecoveryAttempt {
                        vault_id: vault_id.as_deref().map(parse_id).transpose()?,
                        scheme: scheme.parse::<Scheme>().map_err(StoreError::Corrupt)?,
                        fragments_provided: provided as usize,
                        threshold,
                        success,
                        error_type,
                        attempted_at: parse_ts(&at)?,
                    })
                },
            )
            .collect()
    }
}

impl VaultStore for SqliteStore {
    fn create_vault(&self, record: NewVault) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql)?;

        insert_vault(&tx, &record.vault).map_err(sql)?;
        for party in &record.parties {
            tx.execute(
                &format!(
                    "INSERT INTO parties ({PARTY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    party.id.to_string(),
                    party.vault_id.to_string(),
                    party.role.as_str(),
                    party.name,
                    party.email,
                    party.phone,
                    party.invite_token,
                    ts(&party.invite_expires_at),
                    party.status.as_str(),
                ],
            )
            .map_err(sql)?;
        }
        for fragment in &record.fragments {
            tx.execute(
                "INSERT INTO fragments
                    (vault_id, guardian_id, fragment_index, encrypted_data, derivation_salt)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    fragment.vault_id.to_string(),
                    fragment.guardian_id.to_string(),
                    fragment.fragment_index,
                    fragment.encrypted_data,
                    fragment.derivation_salt,
                ],
            )
            .map_err(sql)?;
        }

        // Dropping `tx` on any error above rolls everything back
        tx.commit().map_err(sql)
    }

    fn vault(&self, id: VaultId) -> Result<Option<Vault>, StoreError> {
        Ok(self
            .query_vaults("WHERE id = ?1", Some(id.to_string()))?
            .into_iter()
            .next())
    }

    fn update_vault(&self, vault: &Vault, expected_version: u64) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        update_vault_row(&conn, vault, expected_version)
    }

    fn parties(&self, vault_id: VaultId) -> Result<Vec<Party>, StoreError> {
        self.query_parties("WHERE vault_id = ?1 ORDER BY rowid", vault_id.to_string())
    }

    fn party_by_invite(&self, token: &str) -> Result<Option<Party>, StoreError> {
        Ok(self
            .query_parties("WHERE invite_token = ?1", token.to_string())?
            .into_iter()
            .next())
    }

    fn update_party(&self, party: &Party) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE parties SET name = ?2, email = ?3, phone = ?4, invite_token = ?5,
                    invite_expires_at = ?6, status = ?7
                 WHERE id = ?1",
                params![
                    party.id.to_string(),
                    party.name,
                    party.email,
                    party.phone,
                    party.invite_token,
                    ts(&party.invite_expires_at),
                    party.status.as_str(),
                ],
            )
            .map_err(sql)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("party {}", party.id)));
        }
        Ok(())
    }

    fn fragments(&self, vault_id: VaultId) -> Result<Vec<Fragment>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT vault_id, guardian_id, fragment_index, encrypted_data, derivation_salt
                 FROM fragments WHERE vault_id = ?1 ORDER BY fragment_index",
            )
            .map_err(sql)?;
        let rows: Vec<(String, String, u32, String, String)> = stmt
            .query_map(params![vault_id.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .map_err(sql)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql)?;

        rows.into_iter()
            .map(|(vault_id, guardian_id, fragment_index, encrypted_data, derivation_salt)| {
                Ok(Fragment {
                    vault_id: parse_id(&vault_id)?,
                    guardian_id: parse_id(&guardian_id)?,
                    fragment_index,
                    encrypted_data,
                    derivation_salt,
                })
            })
            .collect()
    }

    fn append_check_in(&self, check_in: &CheckIn) -> Result<(), StoreError> {
        let conn = self.lock()?;
        insert_check_in(&conn, check_in).map_err(sql)
    }

    fn check_ins(&self, vault_id: VaultId) -> Result<Vec<CheckIn>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT vault_id, signature, message, ip_address, checked_in_at
                 FROM check_ins WHERE vault_id = ?1 ORDER BY id",
            )
            .map_err(sql)?;
        let rows: Vec<(String, String, Option<String>, Option<String>, String)> = stmt
            .query_map(params![vault_id.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })
            .map_err(sql)?
            .collect::<rusqlite::Result<_>>()
            .map_err(sql)?;

        rows.into_iter()
            .map(|(vault_id, signature, message, ip_address, at)| {
                Ok(CheckIn {
                    vault_id: parse_id(&vault_id)?,
                    signature,
                    message,
                    ip_address,
                    checked_in_at: parse_ts(&at)?,
                })
            })
            .collect()
    }

    fn list_open_vaults(&self) -> Result<Vec<Vault>, StoreError> {
        self.query_vaults("WHERE status != 'claimed' ORDER BY created_at", None)
    }

    fn record_check_in(
        &self,
        vault: &Vault,
        expected_version: u64,
        check_in: &CheckIn,
    ) -> Result<u64, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(sql)?;
        let version = update_vault_row(&tx, vault, expected_version)?;
        insert_check_in(&tx, check_in).map_err(sql)?;
        tx.commit().map_err(sql)?;
        Ok(version)
    }
}

impl RecoveryMetrics for SqliteStore {
    fn record(&self, attempt: &RecoveryAttempt) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO recovery_attempts
                (vault_id, scheme, fragments_provided, threshold, success, error_type, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attempt.vault_id.map(|id| id.to_string()),
                attempt.scheme.as_str(),
                attempt.fragments_provided as i64,
                attempt.threshold,
                attempt.success,
                attempt.error_type,
                ts(&attempt.attempted_at),
            ],
        )
        .map_err(sql)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;
    use vigil_inherit::PartyInput;

    fn store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 30, 15).unwrap() + Duration::milliseconds(250)
    }

    fn record() -> NewVault {
        let vault = Vault::new("owner@example.com", 30, 7, Scheme::TwoOfThree, t0());
        let guardian = Party::invite(
            vault.id,
            PartyRole::Guardian,
            &PartyInput::new("Ann", "ann@example.com"),
            t0(),
            Duration::days(14),
        );
        let mut heir = Party::invite(
            vault.id,
            PartyRole::Beneficiary,
            &PartyInput::new("Dee", "dee@example.com"),
            t0(),
            Duration::days(14),
        );
        heir.phone = Some("+15550100".into());
        let fragment = Fragment {
            vault_id: vault.id,
            guardian_id: guardian.id,
            fragment_index: 0,
            encrypted_data: "{\"v\":1}".into(),
            derivation_salt: "ann@example.com:fragment:0".into(),
        };
        NewVault {
            vault,
            parties: vec![guardian, heir],
            fragments: vec![fragment],
        }
    }

    #[test]
    fn test_open_db_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let _ = open_db(&path).unwrap();
        // Second open re-runs migrations without error
        let _ = open_db(&path).unwrap();
    }

    #[test]
    fn test_vault_round_trip() {
        let (_dir, store) = store();
        let rec = record();
        let mut vault = rec.vault.clone();
        store.create_vault(rec.clone()).unwrap();

        assert_eq!(store.vault(vault.id).unwrap().unwrap(), vault);
        assert_eq!(store.parties(vault.id).unwrap(), rec.parties);
        assert_eq!(store.fragments(vault.id).unwrap(), rec.fragments);

        vault.status = VaultStatus::Triggered;
        vault.triggered_at = Some(t0() + Duration::days(37));
        vault.attestations.push(Attestation {
            party_id: rec.parties[0].id,
            attested_at: t0(),
        });
        vault.version = store.update_vault(&vault, 0).unwrap();
        assert_eq!(store.vault(vault.id).unwrap().unwrap(), vault);
    }

    #[test]
    fn test_failed_create_rolls_back() {
        let (_dir, store) = store();
        let rec = record();
        store.create_vault(rec.clone()).unwrap();

        // Fresh vault whose party reuses an existing id
        let mut second = record();
        second.parties[0].id = rec.parties[0].id;
        let id = second.vault.id;
        assert!(store.create_vault(second).is_err());

        assert!(store.vault(id).unwrap().is_none());
        assert!(store.fragments(id).unwrap().is_empty());
        assert_eq!(store.list_open_vaults().unwrap().len(), 1);
    }

    #[test]
    fn test_version_conflict() {
        let (_dir, store) = store();
        let rec = record();
        let vault = rec.vault.clone();
        store.create_vault(rec).unwrap();

        assert_eq!(store.update_vault(&vault, 0).unwrap(), 1);
        let err = store.update_vault(&vault, 0).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, found: 1 }));

        let mut missing = vault.clone();
        missing.id = Uuid::new_v4();
        assert!(matches!(
            store.update_vault(&missing, 0),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_check_in_log() {
        let (_dir, store) = store();
        let rec = record();
        let vault = rec.vault.clone();
        store.create_vault(rec).unwrap();

        let entry = CheckIn {
            vault_id: vault.id,
            signature: "sig".into(),
            message: Some("hi".into()),
            ip_address: None,
            checked_in_at: t0(),
        };
        assert_eq!(store.record_check_in(&vault, 0, &entry).unwrap(), 1);

        // Stale version: neither the vault nor the log changes
        assert!(store.record_check_in(&vault, 0, &entry).is_err());
        assert_eq!(store.check_ins(vault.id).unwrap(), vec![entry]);
    }

    #[test]
    fn test_party_lookup_and_update() {
        let (_dir, store) = store();
        let rec = record();
        store.create_vault(rec.clone()).unwrap();

        let mut party = store
            .party_by_invite(&rec.parties[1].invite_token)
            .unwrap()
            .unwrap();
        assert_eq!(party.phone.as_deref(), Some("+15550100"));

        party.status = PartyStatus::Accepted;
        store.update_party(&party).unwrap();
        let reloaded = store.party_by_invite(&party.invite_token).unwrap().unwrap();
        assert_eq!(reloaded.status, PartyStatus::Accepted);
        assert!(store.party_by_invite("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_vaults_and_metrics() {
        let (_dir, store) = store();
        let rec = record();
        let mut vault = rec.vault.clone();
        store.create_vault(rec).unwrap();
        store.create_vault(record()).unwrap();

        vault.status = VaultStatus::Claimed;
        store.update_vault(&vault, 0).unwrap();
        assert_eq!(store.list_open_vaults().unwrap().len(), 1);

        let attempt = RecoveryAttempt {
            vault_id: Some(vault.id),
            scheme: Scheme::ThreeOfFive,
            fragments_provided: 2,
            threshold: 3,
            success: false,
            error_type: Some("INSUFFICIENT_FRAGMENTS".into()),
            attempted_at: t0(),
        };
        store.record(&attempt).unwrap();
        assert_eq!(store.recovery_attempts().unwrap(), vec![attempt]);
    }
}
