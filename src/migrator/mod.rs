//! Versioned schema migration against the live database.
//!
//! The core package ships a schema script written against a placeholder
//! table prefix. [`SchemaMigrator::apply`] substitutes the live prefix,
//! splits the script into individual statements (respecting string literals
//! and comments, so a `;` inside either never splits), and executes them in
//! file order through the [`SqlExecutor`] seam.
//!
//! Execution is a best-effort batch: one failing statement never halts the
//! ones after it. Every failure is captured as data in [`MigrationResult`] —
//! the caller decides whether the aggregate is fatal, and an operator can
//! review the failed statements verbatim before forcing continuation.

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::constants::TABLE_PREFIX_TOKEN;

/// One statement that failed, with the database's error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedStatement {
    /// The statement exactly as executed.
    pub statement: String,
    /// The execution error reported for it.
    pub message: String,
}

/// Outcome of one schema-migration run.
///
/// Invariant: `total_statements == succeeded.len() + failed.len()`, and both
/// sequences preserve file order.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Number of statements attempted.
    pub total_statements: usize,
    /// Statements that executed successfully, in order.
    pub succeeded: Vec<String>,
    /// Statements that failed, in order, with error messages.
    pub failed: Vec<FailedStatement>,
}

impl MigrationResult {
    /// Whether every statement executed successfully.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for MigrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} statement(s): {} succeeded, {} failed",
            self.total_statements,
            self.succeeded.len(),
            self.failed.len()
        )
    }
}

/// Executes raw SQL against the live database.
///
/// The database itself is an external collaborator; this seam is all the
/// migrator needs from it.
pub trait SqlExecutor: Send + Sync {
    /// Execute one statement, returning the affected-row count.
    fn execute(&self, statement: &str) -> Result<u64>;
}

/// [`SqlExecutor`] over a SQLite database file.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&self, statement: &str) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| anyhow!("database connection poisoned"))?;
        let rows = conn.execute(statement, [])?;
        Ok(rows as u64)
    }
}

/// Applies schema scripts through a [`SqlExecutor`].
pub struct SchemaMigrator<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaMigrator<'a> {
    /// Migrator over the given executor.
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Apply `script` with `table_prefix` substituted for the placeholder
    /// token, executing every statement and collecting per-statement
    /// failures without stopping.
    pub fn apply(&self, script: &str, table_prefix: &str) -> MigrationResult {
        let prepared = script.replace(TABLE_PREFIX_TOKEN, table_prefix);
        let statements = split_statements(&prepared);
        let total_statements = statements.len();
        debug!(total_statements, "Applying schema script");

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for statement in statements {
            match self.executor.execute(&statement) {
                Ok(rows) => {
                    debug!(rows, "Statement applied");
                    succeeded.push(statement);
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(%message, "Statement failed, continuing batch");
                    failed.push(FailedStatement { statement, message });
                }
            }
        }

        MigrationResult {
            total_statements,
            succeeded,
            failed,
        }
    }
}

#[derive(PartialEq)]
enum SplitState {
    Normal,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

/// Split a script into statements on `;`, ignoring separators inside
/// quoted literals, backtick identifiers and comments. Segments with no SQL
/// content (trailing comments, blank runs) are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut state = SplitState::Normal;

    while let Some(c) = chars.next() {
        match state {
            SplitState::Normal => match c {
                '\'' => {
                    state = SplitState::SingleQuote;
                    current.push(c);
                }
                '"' => {
                    state = SplitState::DoubleQuote;
                    current.push(c);
                }
                '`' => {
                    state = SplitState::Backtick;
                    current.push(c);
                }
                '#' => {
                    state = SplitState::LineComment;
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = SplitState::LineComment;
                    current.push(c);
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = SplitState::BlockComment;
                    current.push(c);
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                ';' => {
                    push_statement(&mut statements, &mut current);
                }
                _ => current.push(c),
            },
            SplitState::SingleQuote | SplitState::DoubleQuote => {
                current.push(c);
                let quote = if state == SplitState::SingleQuote { '\'' } else { '"' };
                if c == '\\' {
                    // Backslash escape: the next character is literal.
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                } else if c == quote {
                    if chars.peek() == Some(&quote) {
                        // Doubled quote stays inside the literal.
                        if let Some(next) = chars.next() {
                            current.push(next);
                        }
                    } else {
                        state = SplitState::Normal;
                    }
                }
            }
            SplitState::Backtick => {
                current.push(c);
                if c == '`' {
                    state = SplitState::Normal;
                }
            }
            SplitState::LineComment => {
                current.push(c);
                if c == '\n' {
                    state = SplitState::Normal;
                }
            }
            SplitState::BlockComment => {
                current.push(c);
                if c == '*' && chars.peek() == Some(&'/') {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    state = SplitState::Normal;
                }
            }
        }
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = std::mem::take(current);
    let trimmed = statement.trim();
    if !trimmed.is_empty() && has_sql_content(trimmed) {
        statements.push(trimmed.to_string());
    }
}

/// Whether a segment contains anything besides whitespace and comments.
fn has_sql_content(segment: &str) -> bool {
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '#' => {
                while let Some(&n) = chars.peek() {
                    chars.next();
                    if n == '\n' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                while let Some(&n) = chars.peek() {
                    chars.next();
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons_only() {
        let script = "CREATE TABLE a (x INT);\nINSERT INTO a VALUES (1);";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE a (x INT)", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn semicolons_inside_literals_do_not_split() {
        let script = "INSERT INTO t VALUES ('a;b');INSERT INTO t VALUES (\"c;d\");";
        assert_eq!(split_statements(script).len(), 2);
    }

    #[test]
    fn escaped_and_doubled_quotes_stay_inside_literals() {
        let script = r"INSERT INTO t VALUES ('it''s; fine');INSERT INTO t VALUES ('a\'; b');";
        assert_eq!(split_statements(script).len(), 2);
    }

    #[test]
    fn semicolons_inside_comments_do_not_split() {
        let script = "-- setup; phase\nCREATE TABLE a (x INT);\n/* seed; data */\nINSERT INTO a VALUES (1);";
        assert_eq!(split_statements(script).len(), 2);
    }

    #[test]
    fn trailing_comment_segments_are_dropped() {
        let script = "CREATE TABLE a (x INT);\n-- all done\n";
        assert_eq!(split_statements(script), vec!["CREATE TABLE a (x INT)"]);
    }

    #[test]
    fn backtick_identifiers_are_opaque() {
        let script = "CREATE TABLE `weird;name` (x INT);";
        assert_eq!(split_statements(script).len(), 1);
    }

    #[test]
    fn prefix_token_is_substituted() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let migrator = SchemaMigrator::new(&executor);
        let script = "CREATE TABLE /*TABLE_PREFIX*/item (id INTEGER PRIMARY KEY);\n\
                      INSERT INTO /*TABLE_PREFIX*/item (id) VALUES (1);";
        let result = migrator.apply(script, "oc_");
        assert!(result.is_clean(), "failures: {:?}", result.failed);
        assert!(result.succeeded[0].contains("oc_item"));

        let rows = executor.execute("DELETE FROM oc_item").unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn one_failure_does_not_halt_the_batch() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let migrator = SchemaMigrator::new(&executor);

        // Ten statements; the fourth references a table that does not exist.
        let mut script = String::new();
        for i in 0..3 {
            script.push_str(&format!("CREATE TABLE t{i} (id INTEGER);\n"));
        }
        script.push_str("INSERT INTO missing_table VALUES (1);\n");
        for i in 3..9 {
            script.push_str(&format!("CREATE TABLE t{i} (id INTEGER);\n"));
        }

        let result = migrator.apply(&script, "oc_");
        assert_eq!(result.total_statements, 10);
        assert_eq!(result.succeeded.len(), 9);
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].statement.contains("missing_table"));

        // Statements after the failure really ran.
        assert_eq!(executor.execute("DROP TABLE t8").unwrap(), 0);
    }

    #[test]
    fn invariant_holds_on_fully_failing_script() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let migrator = SchemaMigrator::new(&executor);
        let result = migrator.apply("DROP TABLE nope; DROP TABLE also_nope;", "oc_");
        assert_eq!(result.total_statements, 2);
        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 2);
        assert!(!result.is_clean());
    }

    #[test]
    fn empty_script_is_a_clean_noop() {
        let executor = SqliteExecutor::in_memory().unwrap();
        let migrator = SchemaMigrator::new(&executor);
        let result = migrator.apply("\n-- nothing to do\n", "oc_");
        assert_eq!(result.total_statements, 0);
        assert!(result.is_clean());
    }
}
