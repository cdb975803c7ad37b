//! Replay command implementation.
//!
//! A script is a JSON document naming a table and a list of steps:
//!
//! ```json
//! {
//!   "table": "people",
//!   "steps": [
//!     { "op": "begin" },
//!     { "op": "insert", "row": { "id": 5, "fields": { "name": "A" } } },
//!     { "op": "update", "row": { "id": 5, "fields": { "name": "B" } } },
//!     { "op": "commit" }
//!   ]
//! }
//! ```
//!
//! Steps run in order against a cached table over an in-memory row store.
//! A failing step is reported and the replay continues, so scripts can
//! show refused operations as well as the effects that reached the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tabula_core::{
    CacheConfig, CacheKey, CacheResult, Database, Entity, InMemoryRowStore, KeyValue,
    StatsSnapshot, Table, TableDescriptor, UpdateInsertPolicy,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised before a script can run.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The script could not be read.
    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),

    /// The script is not valid JSON or has an unknown step.
    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    /// The requested output format is not supported.
    #[error("unknown output format: {0} (expected text or json)")]
    UnknownFormat(String),
}

/// A row of a script table: an optional integer key and free-form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key; absent for rows of identity tables not yet inserted.
    #[serde(default)]
    pub id: Option<i64>,
    /// Row payload.
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl Entity for Record {
    fn cache_key(&self) -> Option<CacheKey> {
        self.id.map(CacheKey::single)
    }

    fn assign_identity(&mut self, value: KeyValue) {
        if let KeyValue::Int(id) = value {
            self.id = Some(id);
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "({id}) {}", self.fields),
            None => write!(f, "(?) {}", self.fields),
        }
    }
}

/// One scripted call.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Begin a transaction.
    Begin,
    /// Commit the transaction.
    Commit,
    /// Roll the transaction back.
    Rollback,
    /// Insert a row.
    Insert {
        /// Row to insert.
        row: Record,
    },
    /// Update a row.
    Update {
        /// Row to update.
        row: Record,
    },
    /// Update or insert a row.
    Save {
        /// Row to save.
        row: Record,
    },
    /// Delete a row.
    Delete {
        /// Row to delete.
        row: Record,
    },
    /// Read a row by key.
    Select {
        /// Key to read.
        id: i64,
    },
    /// Read every row.
    SelectAll,
    /// Flush buffered writes without committing.
    Flush,
    /// Drop the committed image of a key.
    Evict {
        /// Key to evict.
        id: i64,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
            Self::Insert { row } => write!(f, "insert {row}"),
            Self::Update { row } => write!(f, "update {row}"),
            Self::Save { row } => write!(f, "save {row}"),
            Self::Delete { row } => write!(f, "delete {row}"),
            Self::Select { id } => write!(f, "select ({id})"),
            Self::SelectAll => write!(f, "select all"),
            Self::Flush => write!(f, "flush"),
            Self::Evict { id } => write!(f, "evict ({id})"),
        }
    }
}

/// A parsed script.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Table name used in reports and errors.
    #[serde(default = "default_table")]
    pub table: String,
    /// Steps in execution order.
    pub steps: Vec<Step>,
}

fn default_table() -> String {
    "records".to_owned()
}

/// Options that shape the replayed table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// The table generates its keys.
    pub identity: bool,
    /// Policy for an insert over a pending update.
    pub policy: UpdateInsertPolicy,
}

/// What one step did.
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    /// Position in the script.
    pub index: usize,
    /// The step as written.
    pub step: String,
    /// Whether the step succeeded.
    pub ok: bool,
    /// Rows read, rows returned or the error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One call that reached the row store.
#[derive(Debug, Serialize)]
pub struct CallReport {
    /// Operation name.
    pub op: String,
    /// Addressed key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Rows touched.
    pub rows_affected: u64,
    /// Row image written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<Record>,
}

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Table name.
    pub table: String,
    /// Whether the table generated its keys.
    pub identity: bool,
    /// Policy in effect.
    pub strict: bool,
    /// Per-step outcomes.
    pub steps: Vec<StepOutcome>,
    /// Row store call log, in order.
    pub calls: Vec<CallReport>,
    /// Rows in the store at the end.
    pub rows: Vec<Record>,
    /// Cache statistics at the end.
    pub stats: StatsSnapshot,
}

impl ReplayReport {
    /// Returns the number of steps that failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

/// Runs the replay command.
pub fn run(
    path: &Path,
    identity: bool,
    strict: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = match format {
        "json" => true,
        "text" => false,
        other => return Err(ReplayError::UnknownFormat(other.to_owned()).into()),
    };

    let script = load_script(path)?;
    let options = ReplayOptions {
        identity,
        policy: if strict {
            UpdateInsertPolicy::Strict
        } else {
            UpdateInsertPolicy::Relaxed
        },
    };
    let report = replay(&script, options);
    info!(
        steps = report.steps.len(),
        failures = report.failures(),
        calls = report.calls.len(),
        "replay finished"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }
    Ok(())
}

/// Reads and parses a script file.
pub fn load_script(path: &Path) -> Result<Script, ReplayError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Runs `script` and reports what happened.
///
/// A transaction left open by the script is rolled back at the end.
#[must_use]
pub fn replay(script: &Script, options: ReplayOptions) -> ReplayReport {
    let config = CacheConfig::new()
        .cache_table(script.table.clone())
        .update_insert_policy(options.policy);
    let (descriptor, store) = if options.identity {
        (
            TableDescriptor::identity(script.table.clone()),
            InMemoryRowStore::with_identity(),
        )
    } else {
        (
            TableDescriptor::new(script.table.clone()),
            InMemoryRowStore::new(),
        )
    };

    let db = Database::new(config);
    let mut table = db.table(descriptor, store.clone());

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let outcome = match run_step(&db, &mut table, step) {
            Ok(detail) => StepOutcome {
                index,
                step: step.to_string(),
                ok: true,
                detail,
            },
            Err(err) => StepOutcome {
                index,
                step: step.to_string(),
                ok: false,
                detail: Some(err.to_string()),
            },
        };
        debug!(index, step = %outcome.step, ok = outcome.ok, "step replayed");
        steps.push(outcome);
    }

    if db.is_active() {
        debug!("rolling back transaction left open by script");
        if let Err(err) = db.rollback() {
            warn!(error = %err, "rollback of open transaction failed");
        }
    }

    let calls = store
        .calls()
        .into_iter()
        .map(|call| CallReport {
            op: call.op.to_string(),
            key: call.key.map(|key| key.to_string()),
            rows_affected: call.rows_affected,
            row: call.row,
        })
        .collect();

    ReplayReport {
        table: script.table.clone(),
        identity: options.identity,
        strict: options.policy == UpdateInsertPolicy::Strict,
        steps,
        calls,
        rows: store.rows(),
        stats: db.stats().snapshot(),
    }
}

fn run_step(
    db: &Database,
    table: &mut Table<Record, InMemoryRowStore<Record>>,
    step: &Step,
) -> CacheResult<Option<String>> {
    match step {
        Step::Begin => {
            let id = db.begin()?;
            Ok(Some(id.to_string()))
        }
        Step::Commit => db.commit().map(|()| None),
        Step::Rollback => db.rollback().map(|()| None),
        Step::Insert { row } => {
            let row = table.insert(row.clone())?;
            Ok(row.id.map(|id| format!("key {id}")))
        }
        Step::Update { row } => table.update(row.clone()).map(|()| None),
        Step::Save { row } => {
            let row = table.save(row.clone())?;
            Ok(row.id.map(|id| format!("key {id}")))
        }
        Step::Delete { row } => table.delete(row.clone()).map(|()| None),
        Step::Select { id } => {
            let row = table.select(&CacheKey::single(*id))?;
            Ok(Some(row.map_or_else(|| "none".to_owned(), |row| row.to_string())))
        }
        Step::SelectAll => {
            let rows = table.select_where(|_| true)?;
            Ok(Some(format!("{} rows", rows.len())))
        }
        Step::Flush => {
            let issued = table.flush()?;
            Ok(Some(format!("{issued} effects")))
        }
        Step::Evict { id } => {
            let evicted = table.evict(&CacheKey::single(*id));
            Ok(Some(if evicted { "evicted" } else { "not cached" }.to_owned()))
        }
    }
}

fn print_text(report: &ReplayReport) {
    println!("Table:    {}", report.table);
    println!("Identity: {}", report.identity);
    println!(
        "Policy:   {}",
        if report.strict { "strict" } else { "relaxed" }
    );
    println!();

    println!("Steps:");
    for step in &report.steps {
        let status = if step.ok { "ok" } else { "FAILED" };
        match &step.detail {
            Some(detail) => println!("  {:>3}  {:<40} {status}: {detail}", step.index, step.step),
            None => println!("  {:>3}  {:<40} {status}", step.index, step.step),
        }
    }
    println!();

    println!("Row store calls ({}):", report.calls.len());
    for call in &report.calls {
        let key = call.key.as_deref().unwrap_or("-");
        println!("  {:<10} {:<12} rows={}", call.op, key, call.rows_affected);
    }
    println!();

    println!("Rows ({}):", report.rows.len());
    for row in &report.rows {
        println!("  {row}");
    }
    println!();

    let stats = &report.stats;
    println!("Cache statistics:");
    println!("  Hits:          {}", stats.hits);
    println!("  Misses:        {}", stats.misses);
    println!("  Flushes:       {}", stats.flushes);
    println!("  Cancellations: {}", stats.cancellations);
    println!("  Rejections:    {}", stats.rejections);
    println!("  Commits:       {}", stats.commits);
    println!("  Rollbacks:     {}", stats.rollbacks);
    if let Some(ratio) = stats.hit_ratio() {
        println!("  Hit ratio:     {:.1}%", ratio * 100.0);
    }
}
