//! Replay command implementation.

use super::convert::load_frames;
use docsync_core::{
    DocumentId, DocumentTable, FieldDelta, Fields, ObserveHandle, TableObserver, Value,
};
use docsync_engine::{EngineConfig, MemoryFrameSource, MergeMode, Replicator, StoreRegistry};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    /// Merge mode used.
    pub mode: String,
    /// Number of frames applied.
    pub frames: u64,
    /// Final contents per collection.
    pub collections: Vec<CollectionDump>,
}

/// Final contents of one replica.
#[derive(Debug, Serialize)]
pub struct CollectionDump {
    /// Collection name.
    pub name: String,
    /// Documents, each including `_id`.
    pub documents: Vec<Value>,
}

/// Logs every notification a replica emits.
struct LoggingObserver {
    collection: String,
}

impl TableObserver for LoggingObserver {
    fn added(&self, id: &DocumentId, fields: &Fields) {
        info!(collection = %self.collection, %id, fields = fields.len(), "added");
    }

    fn changed(&self, id: &DocumentId, fields: &FieldDelta) {
        info!(collection = %self.collection, %id, fields = fields.len(), "changed");
    }

    fn removed(&self, id: &DocumentId) {
        info!(collection = %self.collection, %id, "removed");
    }
}

fn parse_mode(mode: &str) -> Result<MergeMode, Box<dyn std::error::Error>> {
    match mode {
        "strict" => Ok(MergeMode::Strict),
        "soft" => Ok(MergeMode::Soft),
        other => Err(format!("Unknown merge mode: {other} (expected strict or soft)").into()),
    }
}

/// Applies the frames in `path` and returns the final replicas.
pub fn replay(path: &Path, mode: &str) -> Result<ReplayResult, Box<dyn std::error::Error>> {
    let mode = parse_mode(mode)?;
    let frames = load_frames(path)?;

    let registry = Arc::new(StoreRegistry::new(EngineConfig::new(mode)));
    let names: BTreeSet<String> = frames.iter().map(|f| f.collection().to_string()).collect();
    let mut tables = Vec::with_capacity(names.len());
    let mut handles: Vec<ObserveHandle> = Vec::with_capacity(names.len());
    for name in names {
        let table = Arc::new(DocumentTable::new(name.clone()));
        handles.push(table.observe(Arc::new(LoggingObserver { collection: name })));
        registry.register_table(Arc::clone(&table))?;
        tables.push(table);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let stats = runtime.block_on(Replicator::new(registry).run(MemoryFrameSource::new(frames)))?;
    drop(handles);

    Ok(ReplayResult {
        mode: mode.to_string(),
        frames: stats.frames,
        collections: tables
            .iter()
            .map(|table| CollectionDump {
                name: table.name().to_string(),
                documents: table.documents().iter().map(|d| d.to_value()).collect(),
            })
            .collect(),
    })
}

/// Runs the replay command.
pub fn run(path: &Path, mode: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = replay(path, mode)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text(&result)?;
    }

    Ok(())
}

fn print_text(result: &ReplayResult) -> Result<(), Box<dyn std::error::Error>> {
    println!("Replayed {} frames ({} mode)", result.frames, result.mode);
    for collection in &result.collections {
        println!();
        println!("{} ({} documents)", collection.name, collection.documents.len());
        for doc in &collection.documents {
            println!("  {}", serde_json::to_string(doc)?);
        }
    }
    Ok(())
}
