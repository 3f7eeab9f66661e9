use log::info;
use rusqlite::Connection;

use crate::paths::Directories;

/// Open (or create) the submission registry in the working directory
///
/// A `dry_run` save point is opened straight away, so every change made through this connection
/// can be discarded with [release_or_rollback].
pub fn open_db(dirs: &Directories) -> rusqlite::Result<Connection> {
    let path = dirs.registry();
    if !path.exists() { info!("Creating new submission registry {}", path.display()) }
    let conn = Connection::open(&path)?;

    static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));
    conn.execute(SCHEMA, [])?;

    info!("Creating dry run save point");
    conn.execute("SAVEPOINT dry_run", [])?;

    Ok(conn)
}

pub fn release_or_rollback(conn: &Connection, dry_run: bool) -> rusqlite::Result<()> {
    match dry_run {
        true => {
            info!("--dry set, rolling back registry state");
            conn.execute("ROLLBACK TO dry_run", [])?;
            conn.execute("RELEASE dry_run", [])?;
        }
        false => {
            info!("--dry not set, releasing dry run save point");
            conn.execute("RELEASE dry_run", [])?;
        }
    }
    Ok(())
}
