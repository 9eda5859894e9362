use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::model::{Settings, TimelineState};

pub const STATE_FILE: &str = "state.json";

#[derive(Debug)]
pub struct StateStore {
    pub data_dir: PathBuf,
    pub state_path: PathBuf,
}

impl StateStore {
    /// Opens the data directory, seeding `state.json` with the starter
    /// document when it does not exist yet.
    #[tracing::instrument(skip(data_dir, now))]
    pub fn open(data_dir: &Path, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let state_path = data_dir.join(STATE_FILE);
        let store = Self {
            data_dir,
            state_path,
        };

        if !store.state_path.exists() {
            info!(file = %store.state_path.display(), "seeding sample timeline state");
            store.save(&TimelineState::sample(now))?;
        }

        info!(
            data_dir = %store.data_dir.display(),
            state = %store.state_path.display(),
            "opened state store"
        );
        Ok(store)
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<TimelineState> {
        let raw = fs::read_to_string(&self.state_path)
            .with_context(|| format!("failed reading {}", self.state_path.display()))?;
        if raw.trim().is_empty() {
            debug!("state file empty; using empty document");
            return Ok(TimelineState::default());
        }
        let state: TimelineState = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.state_path.display()))?;
        debug!(
            types = state.types.len(),
            tasks = state.tasks.len(),
            "loaded timeline state"
        );
        Ok(state)
    }

    #[tracing::instrument(skip(self, state))]
    pub fn save(&self, state: &TimelineState) -> anyhow::Result<()> {
        save_json_atomic(&self.state_path, state)
            .with_context(|| format!("failed to save {}", self.state_path.display()))
    }

    /// Replaces tasks and types with the imported document and
    /// shallow-merges its settings over the current ones.
    #[tracing::instrument(skip(self))]
    pub fn import_file(&self, path: &Path) -> anyhow::Result<TimelineState> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let current = self.load()?;
        let merged = merge_import(current, &raw)
            .with_context(|| format!("failed importing {}", path.display()))?;
        self.save(&merged)?;
        info!(
            file = %path.display(),
            tasks = merged.tasks.len(),
            types = merged.types.len(),
            "imported timeline state"
        );
        Ok(merged)
    }

    #[tracing::instrument(skip(self))]
    pub fn export_file(&self, path: &Path) -> anyhow::Result<()> {
        let state = self.load()?;
        save_json_atomic(path, &state)
            .with_context(|| format!("failed exporting to {}", path.display()))?;
        info!(file = %path.display(), "exported timeline state");
        Ok(())
    }
}

pub fn merge_import(current: TimelineState, raw: &str) -> anyhow::Result<TimelineState> {
    let doc: Value = serde_json::from_str(raw).context("invalid JSON")?;
    let obj = doc
        .as_object()
        .ok_or_else(|| anyhow!("import must be a JSON object"))?;

    let tasks = obj.get("tasks").filter(|v| v.is_array());
    let types = obj.get("types").filter(|v| v.is_array());
    let (Some(tasks), Some(types)) = (tasks, types) else {
        return Err(anyhow!("import must contain `tasks` and `types` arrays"));
    };

    let mut state = current;
    state.tasks = serde_json::from_value(tasks.clone()).context("invalid tasks")?;
    state.types = serde_json::from_value(types.clone()).context("invalid types")?;

    if let Some(Value::Object(incoming)) = obj.get("settings") {
        state.settings = merge_settings(&state.settings, incoming)?;
    }

    Ok(state)
}

fn merge_settings(
    current: &Settings,
    incoming: &serde_json::Map<String, Value>,
) -> anyhow::Result<Settings> {
    let mut base = match serde_json::to_value(current)? {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, value) in incoming {
        base.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(base)).context("invalid settings")
}

#[tracing::instrument(skip(path, state))]
fn save_json_atomic(path: &Path, state: &TimelineState) -> anyhow::Result<()> {
    debug!(file = %path.display(), tasks = state.tasks.len(), "saving json atomically");

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, state)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
