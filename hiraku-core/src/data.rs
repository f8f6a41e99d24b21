use crate::analyze::AnalysisReport;
use rusqlite::{Connection, Result, params};
use std::path::Path;

/// Optional run-history store. The engine never needs it; the CLI
/// persists reports here when asked so repeated analyses of one site can
/// be compared.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS analysis_runs (
                id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                app_root TEXT NOT NULL,
                base_url TEXT NOT NULL,
                server_owned BOOLEAN NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS route_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                path TEXT NOT NULL,
                is_dynamic BOOLEAN NOT NULL DEFAULT 0,
                skipped TEXT,
                title TEXT,
                description TEXT,
                image_url TEXT,

                FOREIGN KEY(run_id) REFERENCES analysis_runs(id) ON DELETE CASCADE,
                UNIQUE(run_id, path)
            );

            CREATE INDEX IF NOT EXISTS idx_route_results_run ON route_results(run_id);

            CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                route_id INTEGER NOT NULL,

                kind TEXT NOT NULL CHECK(kind IN (
                    'fetch_failed',
                    'image_unreachable',
                    'missing_field',
                    'length_warning',
                    'aspect_ratio_warning'
                )),
                severity TEXT NOT NULL CHECK(severity IN ('error', 'warning', 'info')),
                field TEXT,
                message TEXT NOT NULL,

                FOREIGN KEY(run_id) REFERENCES analysis_runs(id) ON DELETE CASCADE,
                FOREIGN KEY(route_id) REFERENCES route_results(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_issues_run ON issues(run_id);
            CREATE INDEX IF NOT EXISTS idx_issues_severity ON issues(run_id, severity);
            ",
        )?;
        Ok(())
    }

    /// Persists a completed report, returning the new run id.
    pub fn store_report(&self, report: &AnalysisReport, app_root: &str) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO analysis_runs (id, started_at, finished_at, app_root, base_url, server_owned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &run_id,
                report.started_at.timestamp(),
                report.finished_at.timestamp(),
                app_root,
                &report.base_url,
                report.server_owned,
            ],
        )?;

        for analysis in &report.routes {
            self.conn.execute(
                "INSERT INTO route_results (run_id, path, is_dynamic, skipped, title, description, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    &run_id,
                    &analysis.route.path,
                    analysis.route.is_dynamic,
                    &analysis.skipped,
                    &analysis.metadata.title,
                    &analysis.metadata.description,
                    &analysis.metadata.image_url,
                ],
            )?;
            let route_id = self.conn.last_insert_rowid();

            for issue in &analysis.issues {
                self.conn.execute(
                    "INSERT INTO issues (run_id, route_id, kind, severity, field, message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        &run_id,
                        route_id,
                        issue.kind.as_str(),
                        issue.severity.as_str(),
                        &issue.field,
                        &issue.message,
                    ],
                )?;
            }
        }

        Ok(run_id)
    }

    pub fn issue_counts_by_severity(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT severity, COUNT(*) FROM issues WHERE run_id = ?1 GROUP BY severity",
        )?;

        let counts = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;

        Ok(counts)
    }

    pub fn routes_by_run(&self, run_id: &str) -> Result<Vec<(i64, String, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, skipped FROM route_results WHERE run_id = ?1 ORDER BY id",
        )?;

        let routes = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(routes)
    }

    pub fn list_runs(&self) -> Result<Vec<(String, i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, started_at, base_url FROM analysis_runs ORDER BY started_at DESC")?;

        let runs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>>>()?;

        Ok(runs)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
