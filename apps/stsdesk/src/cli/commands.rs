//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::Backend;
use crate::api::{self, EquipmentJson, RecordJson, VerifyResponse, payload_from_json};
use crate::config::Config;
use serde_json::json;
use std::path::{Path, PathBuf};
use stsdesk_core::{
    AttachmentStore, Decision, FormStatus, Ledger, LedgerError, ListFilter, Payload, RecordId,
    Timestamp, Upload, VersionedRecord, primitives::MAX_ATTACHMENT_SIZE,
};

// =============================================================================
// CONTEXT
// =============================================================================

/// Global options every command sees.
#[derive(Debug)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
    pub config: Config,
}

// =============================================================================
// FILE LIMITS
// =============================================================================

/// Maximum size of a JSON fields file (1 MiB).
const MAX_FIELDS_FILE_SIZE: u64 = 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), LedgerError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| LedgerError::Io(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > max_size {
        return Err(LedgerError::InvalidInput(format!(
            "File '{}' is {} bytes, maximum is {}",
            path.display(),
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, LedgerError> {
    let canonical = path.canonicalize().map_err(|e| {
        LedgerError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(LedgerError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Canonicalize the parent of an output path.
fn validate_output_path(path: &Path) -> Result<PathBuf, LedgerError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| {
        LedgerError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    let filename = path
        .file_name()
        .ok_or_else(|| LedgerError::Io("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

// =============================================================================
// INPUT PARSING
// =============================================================================

/// Read a JSON object of form fields.
pub fn read_fields_file(path: &Path) -> Result<Payload, LedgerError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_FIELDS_FILE_SIZE)?;
    let raw = std::fs::read(&path)
        .map_err(|e| LedgerError::Io(format!("Read '{}': {}", path.display(), e)))?;
    let value: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|e| LedgerError::InvalidInput(format!("'{}': {}", path.display(), e)))?;
    match value {
        serde_json::Value::Object(map) => Ok(payload_from_json(&map)),
        _ => Err(LedgerError::InvalidInput(format!(
            "'{}' must hold a JSON object of fields",
            path.display()
        ))),
    }
}

/// Parse `FIELD=PATH` arguments into uploads.
pub fn read_attachments(specs: &[String]) -> Result<Vec<Upload>, LedgerError> {
    specs
        .iter()
        .map(|spec| {
            let (field, path) = spec.split_once('=').ok_or_else(|| {
                LedgerError::InvalidInput(format!("attachment '{}' is not FIELD=PATH", spec))
            })?;
            let path = validate_file_path(Path::new(path))?;
            validate_file_size(&path, MAX_ATTACHMENT_SIZE as u64)?;
            let bytes = std::fs::read(&path)
                .map_err(|e| LedgerError::Io(format!("Read '{}': {}", path.display(), e)))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Upload::new(field.trim(), file_name, bytes))
        })
        .collect()
}

// =============================================================================
// LEDGER ACCESS
// =============================================================================

/// Open the ledger selected by the global options.
pub fn open_ledger(ctx: &Context) -> Result<Ledger, LedgerError> {
    let kinds = ctx.config.registry()?;
    let ledger = match ctx.backend {
        Backend::Redb => Ledger::with_redb(&ctx.database, kinds)?,
        Backend::Memory => Ledger::in_memory(kinds),
    };
    Ok(ledger.with_attachments(AttachmentStore::new(&ctx.config.storage.uploads_dir)))
}

fn print_json(value: &serde_json::Value) -> Result<(), LedgerError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn record_value(record: &VersionedRecord) -> serde_json::Value {
    serde_json::to_value(RecordJson::from(record)).unwrap_or_default()
}

fn print_record_line(record: &VersionedRecord) {
    println!(
        "  #{:<6} lineage {:<6} v{:<5} {:<12} {:<9} {}",
        record.id,
        record.lineage,
        record.version,
        record
            .form_code
            .as_ref()
            .map(|c| c.as_str())
            .unwrap_or("-"),
        record.status,
        record
            .effective_date()
            .map(|d| d.to_string())
            .unwrap_or_default()
    );
}

fn print_record(action: &str, record: &VersionedRecord, json_mode: bool) -> Result<(), LedgerError> {
    if json_mode {
        return print_json(&record_value(record));
    }
    println!("{} record {} (lineage {})", action, record.id, record.lineage);
    println!("  Version:   {}", record.version);
    println!(
        "  Form code: {}",
        record.form_code.as_ref().map(|c| c.as_str()).unwrap_or("-")
    );
    println!("  Status:    {}", record.status);
    if !record.attachments.is_empty() {
        let fields: Vec<&str> = record.attachments.keys().map(String::as_str).collect();
        println!("  Files:     {}", fields.join(", "));
    }
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    ctx: &Context,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), LedgerError> {
    let ledger = open_ledger(ctx)?;
    let host = host.unwrap_or_else(|| ctx.config.server.host.clone());
    let port = port.unwrap_or(ctx.config.server.port);

    println!("stsdesk Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", ctx.backend.as_str());
    println!("  Database: {}", ctx.database.display());
    println!("  Uploads:  {}", ctx.config.storage.uploads_dir.display());
    println!("  Kinds:    {}", ledger.kinds().len());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, ledger, &ctx.config).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), LedgerError> {
    if ctx.backend == Backend::Memory {
        return Err(LedgerError::InvalidInput(
            "the memory backend has nothing to initialize".to_string(),
        ));
    }
    if ctx.database.exists() {
        if !force {
            return Err(LedgerError::InvalidInput(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| LedgerError::Io(format!("Remove old database: {}", e)))?;
    }
    let ledger = open_ledger(ctx)?;
    tracing::info!(path = %ctx.database.display(), "Initialized database");
    if ctx.json_mode {
        return print_json(&json!({
            "database": ctx.database.to_string_lossy(),
            "kinds": ledger.kinds().len(),
        }));
    }
    println!("Initialized new redb database at {}", ctx.database.display());
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show ledger counts.
pub fn cmd_status(ctx: &Context) -> Result<(), LedgerError> {
    let ledger = open_ledger(ctx)?;
    let status = api::StatusResponse::from_ledger(&ledger)?;
    let uploads = ledger
        .attachment_root()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    if ctx.json_mode {
        return print_json(&json!({
            "database": ctx.database.to_string_lossy(),
            "backend": ctx.backend.as_str(),
            "uploads": uploads,
            "records": status.records,
            "lineages": status.lineages,
            "equipment": status.equipment,
            "kinds": status.kinds,
            "next_form_codes": status.next_form_codes,
        }));
    }

    println!("stsdesk Ledger Status");
    println!("=====================");
    println!("Database:  {}", ctx.database.display());
    println!("Backend:   {}", ctx.backend.as_str());
    println!("Uploads:   {}", uploads);
    println!();
    println!("Records:   {}", status.records);
    println!("Lineages:  {}", status.lineages);
    println!("Equipment: {}", status.equipment);
    println!("Kinds:     {}", status.kinds.join(", "));
    if !status.next_form_codes.is_empty() {
        println!();
        println!("Next form codes:");
        for (kind, code) in &status.next_form_codes {
            println!("  {:<20} {}", kind, code);
        }
    }
    Ok(())
}

// =============================================================================
// LIST / HISTORY COMMANDS
// =============================================================================

/// List heads of a kind.
pub fn cmd_list(
    ctx: &Context,
    kind: &str,
    year: Option<i32>,
    month: Option<u8>,
    status: Option<&str>,
) -> Result<(), LedgerError> {
    let mut filter = ListFilter::new();
    if let Some(year) = year {
        filter = filter.year(year);
    }
    if let Some(month) = month {
        filter = filter.month(month);
    }
    if let Some(status) = status {
        filter = filter.status(FormStatus::parse(status)?);
    }

    let ledger = open_ledger(ctx)?;
    let listing = ledger.list(kind, &filter)?;

    if ctx.json_mode {
        let data: Vec<_> = listing.records.iter().map(record_value).collect();
        return print_json(&json!({ "data": data, "years": listing.years }));
    }

    println!("{} ({} shown)", kind, listing.records.len());
    for record in &listing.records {
        print_record_line(record);
    }
    if !listing.years.is_empty() {
        let years: Vec<String> = listing.years.iter().map(ToString::to_string).collect();
        println!("Years: {}", years.join(", "));
    }
    Ok(())
}

/// Show the whole lineage of a record.
pub fn cmd_history(ctx: &Context, kind: &str, id: u64) -> Result<(), LedgerError> {
    let ledger = open_ledger(ctx)?;
    let record = ledger.get_of_kind(kind, RecordId(id))?;
    let history = ledger.history(record.lineage)?;

    if ctx.json_mode {
        let data: Vec<_> = history.iter().map(record_value).collect();
        return print_json(&json!({ "lineage_id": record.lineage.0, "data": data }));
    }

    println!("Lineage {} ({} versions)", record.lineage, history.len());
    for version in &history {
        print_record_line(version);
    }
    Ok(())
}

// =============================================================================
// WRITE COMMANDS
// =============================================================================

/// Start a lineage.
pub fn cmd_create(
    ctx: &Context,
    kind: &str,
    file: &Path,
    attach: &[String],
) -> Result<(), LedgerError> {
    let payload = read_fields_file(file)?;
    let uploads = read_attachments(attach)?;
    let mut ledger = open_ledger(ctx)?;
    let record = ledger.create(kind, payload, uploads)?;
    tracing::info!(
        event = "record_created",
        lineage = record.lineage.0,
        record = record.id.0,
        "Lineage created"
    );
    print_record("Created", &record, ctx.json_mode)
}

/// Append a version to a head.
pub fn cmd_amend(
    ctx: &Context,
    kind: &str,
    id: u64,
    file: Option<&Path>,
    attach: &[String],
) -> Result<(), LedgerError> {
    let changes = match file {
        Some(file) => read_fields_file(file)?,
        None => Payload::new(),
    };
    let uploads = read_attachments(attach)?;
    let mut ledger = open_ledger(ctx)?;
    let record = ledger.amend(kind, RecordId(id), changes, uploads)?;
    tracing::info!(
        event = "record_amended",
        lineage = record.lineage.0,
        record = record.id.0,
        version = %record.version,
        "Lineage amended"
    );
    print_record("Amended", &record, ctx.json_mode)
}

/// Approve or reject a pending head.
pub fn cmd_review(
    ctx: &Context,
    kind: &str,
    id: u64,
    reviewer: &str,
    decision: &str,
    comment: Option<String>,
) -> Result<(), LedgerError> {
    let decision = Decision::parse(decision)?;
    let mut ledger = open_ledger(ctx)?;
    let record = ledger.review(kind, RecordId(id), reviewer, decision, comment)?;
    print_record("Reviewed", &record, ctx.json_mode)
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Audit every lineage; a dirty ledger is an error.
pub fn cmd_verify(ctx: &Context) -> Result<(), LedgerError> {
    let ledger = open_ledger(ctx)?;
    let report = ledger.verify()?;
    let clean = report.is_clean();
    let count = report.violations.len();

    if ctx.json_mode {
        let value = serde_json::to_value(VerifyResponse::from(report))
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        print_json(&value)?;
    } else {
        println!(
            "Checked {} lineages, {} records",
            report.lineages_checked, report.records_checked
        );
        for violation in &report.violations {
            println!("  VIOLATION: {}", violation);
        }
        if clean {
            println!("Ledger is consistent.");
        }
    }

    if clean {
        Ok(())
    } else {
        Err(LedgerError::InvariantViolation(format!(
            "{} violation(s) found",
            count
        )))
    }
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Build the export document.
pub fn export_document(ledger: &Ledger) -> Result<serde_json::Value, LedgerError> {
    let lineages: Vec<_> = ledger
        .export_lineages()?
        .iter()
        .map(|l| {
            json!({
                "lineage_id": l.lineage.0,
                "kind": l.kind.as_str(),
                "versions": l.versions.iter().map(record_value).collect::<Vec<_>>(),
            })
        })
        .collect();
    let equipment: Vec<_> = ledger
        .export_equipment()?
        .iter()
        .map(EquipmentJson::from)
        .collect();
    Ok(json!({
        "exported_at": Timestamp::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "lineages": lineages,
        "equipment": equipment,
    }))
}

/// Write the export document to `output`.
pub fn cmd_export(ctx: &Context, output: &Path) -> Result<(), LedgerError> {
    let output = validate_output_path(output)?;
    let ledger = open_ledger(ctx)?;
    let document = export_document(&ledger)?;
    let data = serde_json::to_vec_pretty(&document)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    std::fs::write(&output, &data)
        .map_err(|e| LedgerError::Io(format!("Write '{}': {}", output.display(), e)))?;

    let summary = ledger.summary()?;
    if ctx.json_mode {
        return print_json(&json!({
            "output": output.to_string_lossy(),
            "lineages": summary.lineages,
            "records": summary.records,
            "bytes": data.len(),
        }));
    }
    println!(
        "Exported {} lineages ({} records) to {}",
        summary.lineages,
        summary.records,
        output.display()
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
