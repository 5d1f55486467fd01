//! Lookup database schema and migrations
//!
//! The lookup tables are normally populated by an external wiki scraper. The
//! migrations only create what is missing so a fresh install can start empty.

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Base stats per champion
        CREATE TABLE IF NOT EXISTS champion_stat (
            champion_id TEXT PRIMARY KEY,
            hp REAL,
            mp REAL,
            armor REAL,
            spell_block REAL,
            attack_damage REAL,
            attack_speed REAL,
            move_speed REAL
        );

        -- Abilities, one row per slot
        CREATE TABLE IF NOT EXISTS champion_spells (
            champion_name TEXT NOT NULL,
            slot TEXT NOT NULL CHECK(slot IN ('Q', 'W', 'E', 'R', 'Passive')),
            name TEXT NOT NULL,
            description TEXT,
            cooldown TEXT,
            cost TEXT,
            PRIMARY KEY (champion_name, slot)
        );

        -- Short stories
        CREATE TABLE IF NOT EXISTS champion_story (
            champion_name TEXT PRIMARY KEY,
            title TEXT,
            content TEXT
        );

        -- Lore summaries
        CREATE TABLE IF NOT EXISTS champions_background (
            name TEXT PRIMARY KEY,
            title TEXT,
            quote TEXT,
            biography TEXT,
            role TEXT,
            region TEXT
        );

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Recommended item order per champion
        CREATE TABLE IF NOT EXISTS champion_build (
            champion_name TEXT NOT NULL,
            position INTEGER NOT NULL,
            item_id INTEGER NOT NULL,
            item_name TEXT NOT NULL,
            PRIMARY KEY (champion_name, position)
        );

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2");
    Ok(())
}
