//! Migration engine
//!
//! Migration scripts are `NNNN_description.up.sql` files applied in file-name
//! order. There is no version table: every statement is expected to be
//! idempotent, either by using `IF NOT EXISTS` or by failing with one of the
//! [`IDEMPOTENCY_MARKERS`], which count as "already applied".

use crate::db::Database;
use fabula_core::{Error, Result};
use include_dir::{include_dir, Dir};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

static EMBEDDED_MIGRATIONS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/migrations");

/// File suffix of an up-migration
pub const MIGRATION_SUFFIX: &str = ".up.sql";

/// Error fragments (matched case-insensitively) that mean a statement was
/// already applied
pub const IDEMPOTENCY_MARKERS: &[&str] = &[
    "duplicate column name",
    "already exists",
    "table already exists",
    "index already exists",
];

/// Relative locations searched by [`discover_migrations_dir`]
const CANDIDATE_DIRS: &[&str] = &["migrations", "crates/fabula-store/migrations"];

/// How many parent directories the search climbs
const MAX_SEARCH_DEPTH: usize = 5;

/// Where migration scripts come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MigrationSource {
    /// Scripts compiled into this crate
    #[default]
    Embedded,
    /// Scripts read from a directory at run time
    Directory(PathBuf),
}

/// One migration script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name, e.g. `0001_tenants.up.sql`
    pub name: String,
    /// Script body
    pub sql: String,
}

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Files applied, in order
    pub files_applied: Vec<String>,
    /// Statements that ran successfully
    pub statements_executed: usize,
    /// Statements whose error matched an idempotency marker
    pub statements_suppressed: usize,
}

/// Applies migration scripts to a [`Database`]
#[derive(Debug, Clone)]
pub struct Migrator {
    source: MigrationSource,
}

impl Migrator {
    /// Create a migrator reading from `source`
    #[must_use]
    pub fn new(source: MigrationSource) -> Self {
        Self { source }
    }

    /// Load every up-migration, sorted by file name
    pub fn load(&self) -> Result<Vec<MigrationFile>> {
        let mut files = match &self.source {
            MigrationSource::Embedded => load_embedded(),
            MigrationSource::Directory(dir) => load_directory(dir)?,
        };
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Apply every migration in order
    ///
    /// The first statement failing with a non-idempotency error aborts the
    /// run with [`Error::Migration`] naming the file.
    #[instrument(skip(self, db), fields(source = ?self.source))]
    pub async fn run(&self, db: &Database) -> Result<MigrationReport> {
        let files = self.load()?;
        let mut report = MigrationReport::default();

        for file in &files {
            for statement in split_statements(&file.sql) {
                match db
                    .execute(sqlx::query(&statement).persistent(false))
                    .await
                {
                    Ok(_) => report.statements_executed += 1,
                    Err(err) => {
                        let message = err.to_string();
                        if !is_idempotency_error(&message) {
                            return Err(Error::Migration {
                                file: file.name.clone(),
                                cause: message,
                            });
                        }
                        warn!(file = %file.name, "Statement already applied: {message}");
                        report.statements_suppressed += 1;
                    }
                }
            }
            debug!(file = %file.name, "Migration applied");
            report.files_applied.push(file.name.clone());
        }

        info!(
            files = report.files_applied.len(),
            executed = report.statements_executed,
            suppressed = report.statements_suppressed,
            "Migrations complete"
        );
        Ok(report)
    }
}

fn load_embedded() -> Vec<MigrationFile> {
    EMBEDDED_MIGRATIONS
        .files()
        .filter_map(|file| {
            let name = file.path().file_name()?.to_str()?.to_string();
            if !name.ends_with(MIGRATION_SUFFIX) {
                return None;
            }
            let sql = file.contents_utf8()?.to_string();
            Some(MigrationFile { name, sql })
        })
        .collect()
}

fn load_directory(dir: &Path) -> Result<Vec<MigrationFile>> {
    let read_error = |cause: std::io::Error| Error::Migration {
        file: dir.display().to_string(),
        cause: cause.to_string(),
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(MIGRATION_SUFFIX) || !path.is_file() {
            continue;
        }
        let sql = std::fs::read_to_string(&path).map_err(|e| Error::Migration {
            file: name.to_string(),
            cause: e.to_string(),
        })?;
        files.push(MigrationFile {
            name: name.to_string(),
            sql,
        });
    }
    Ok(files)
}

/// Split a script into statements
///
/// `--` comments (outside string literals) and blank lines are dropped; a
/// statement ends at a line whose last character is `;`. Trailing text with
/// no terminator is returned as a final statement.
#[must_use]
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
        if line.ends_with(';') {
            statements.push(std::mem::take(&mut current));
        }
    }

    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_dash = false;

    for (i, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '-' if !in_single && !in_double => {
                if prev_dash {
                    return &line[..i - 1];
                }
                prev_dash = true;
                continue;
            }
            _ => {}
        }
        prev_dash = false;
    }
    line
}

/// True when a driver error message means "already applied"
#[must_use]
pub fn is_idempotency_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    IDEMPOTENCY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Locate a migrations directory on disk
///
/// Searches the working directory and up to five of its parents, then the
/// directory of the running executable.
#[must_use]
pub fn discover_migrations_dir() -> Option<PathBuf> {
    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| discover_from(&cwd))
    {
        return Some(found);
    }

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .and_then(|dir| discover_from(&dir))
}

/// Search `start` and its ancestors for a directory holding up-migrations
#[must_use]
pub fn discover_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(MAX_SEARCH_DEPTH + 1)
        .flat_map(|base| CANDIDATE_DIRS.iter().map(move |c| base.join(c)))
        .find(|candidate| has_migrations(candidate))
}

fn has_migrations(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.ends_with(MIGRATION_SUFFIX))
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    #[test]
    fn test_split_statements() {
        let sql = "-- header\nCREATE TABLE a (\n    id TEXT -- key\n);\n\nCREATE INDEX i ON a(id);\n";
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a (\nid TEXT\n);");
        assert_eq!(statements[1], "CREATE INDEX i ON a(id);");
    }

    #[test]
    fn test_split_keeps_dashes_in_strings() {
        let statements = split_statements("INSERT INTO t VALUES ('a--b');");
        assert_eq!(statements, vec!["INSERT INTO t VALUES ('a--b');"]);
    }

    #[test]
    fn test_split_unterminated_tail() {
        let statements = split_statements("SELECT 1;\nSELECT 2");
        assert_eq!(statements, vec!["SELECT 1;", "SELECT 2"]);
    }

    #[test]
    fn test_idempotency_markers() {
        assert!(is_idempotency_error("duplicate column name: parent_id"));
        assert!(is_idempotency_error("table worlds Already Exists"));
        assert!(!is_idempotency_error("syntax error near \"TABLEE\""));
    }

    #[test]
    fn test_embedded_files_sorted() {
        let files = Migrator::new(MigrationSource::Embedded).load().unwrap();
        assert!(!files.is_empty());
        let names: Vec<_> = files.iter().map(|f| f.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.iter().all(|n| n.ends_with(MIGRATION_SUFFIX)));
    }

    #[test]
    fn test_discover_from_nested_dir() {
        let root = tempfile::tempdir().unwrap();
        let migrations = root.path().join("migrations");
        std::fs::create_dir_all(&migrations).unwrap();
        std::fs::write(migrations.join("0001_init.up.sql"), "SELECT 1;").unwrap();
        let nested = root.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(discover_from(&nested), Some(migrations));
    }

    #[tokio::test]
    async fn test_second_run_is_suppressed_only() {
        let db = Database::in_memory().await.unwrap();
        let report = db.migrate(MigrationSource::Embedded).await.unwrap();
        assert!(report.statements_suppressed > 0);
        assert!(!report.files_applied.is_empty());
    }

    #[tokio::test]
    async fn test_directory_source_failure_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("0001_ok.up.sql"),
            "CREATE TABLE IF NOT EXISTS t (id TEXT);\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("0002_bad.up.sql"), "CREATE TABLEE nope;\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let db = Database::open(&StoreConfig::in_memory()).await.unwrap();
        let err = db
            .migrate(MigrationSource::Directory(dir.path().to_path_buf()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Migration { ref file, .. } if file == "0002_bad.up.sql"));
    }
}
