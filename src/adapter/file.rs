//! File adapter
//!
//! Inbound mode collects the files in a directory that match a wildcard
//! pattern; outbound mode writes the payload to a file.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use super::config::{AdapterMode, AdapterType, Properties, PropertyReader};
use super::{ensure_initialized, Adapter, AdapterError, AdapterOperationResult};
use crate::engine::result::AdapterExecutionResult;
use crate::workflow::context::AdapterExecutionContext;

#[derive(Debug, Clone, PartialEq)]
pub struct FileSettings {
    pub directory: PathBuf,
    pub file_pattern: String,
    pub archive_directory: Option<PathBuf>,
    pub encoding: String,
    pub polling_interval_ms: u64,
    pub file_name: Option<String>,
}

impl FileSettings {
    pub fn from_properties(props: &Properties, _mode: AdapterMode) -> Result<Self, AdapterError> {
        let reader = PropertyReader::new(props);

        let encoding = reader.string_or("encoding", "UTF-8")?;
        if !matches!(encoding.to_uppercase().as_str(), "UTF-8" | "UTF8") {
            return Err(AdapterError::InvalidProperty {
                property: "encoding".to_string(),
                message: format!("unsupported encoding '{}'", encoding),
            });
        }

        Ok(Self {
            directory: PathBuf::from(reader.require_string("directory")?),
            file_pattern: reader.string_or("filePattern", "*")?,
            archive_directory: reader.string("archiveDirectory")?.map(PathBuf::from),
            encoding,
            polling_interval_ms: reader.u64_or("pollingInterval", 60000)?,
            file_name: reader.string("fileName")?,
        })
    }
}

/// Match a file name against a pattern using `*` and `?` wildcards
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

pub struct FileAdapter {
    mode: AdapterMode,
    settings: FileSettings,
    initialized: AtomicBool,
}

impl FileAdapter {
    pub fn new(mode: AdapterMode, settings: FileSettings) -> Self {
        Self {
            mode,
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &FileSettings {
        &self.settings
    }

    async fn collect_files(&self) -> Result<Value, AdapterError> {
        let mut entries = tokio::fs::read_dir(&self.settings.directory).await?;
        let mut matched: Vec<PathBuf> = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if wildcard_match(&self.settings.file_pattern, &name) {
                matched.push(entry.path());
            }
        }
        matched.sort();

        let mut files = Vec::with_capacity(matched.len());
        for path in matched {
            let content = tokio::fs::read_to_string(&path).await?;
            let name = file_name(&path);
            if let Some(archive) = &self.settings.archive_directory {
                tokio::fs::create_dir_all(archive).await?;
                tokio::fs::rename(&path, archive.join(&name)).await?;
            }
            files.push(json!({ "name": name, "content": content }));
        }

        debug!(
            "Collected {} file(s) from {}",
            files.len(),
            self.settings.directory.display()
        );
        Ok(Value::Array(files))
    }

    async fn write_payload(&self, ctx: &AdapterExecutionContext) -> Result<Value, AdapterError> {
        let name = ctx
            .parameters
            .get("fileName")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.settings.file_name.clone())
            .unwrap_or_else(|| format!("{}.json", uuid::Uuid::new_v4()));

        let contents = match &ctx.input {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other)?,
        };

        tokio::fs::create_dir_all(&self.settings.directory).await?;
        let path = self.settings.directory.join(&name);
        tokio::fs::write(&path, contents.as_bytes()).await?;

        Ok(json!({
            "path": path.display().to_string(),
            "bytes": contents.len(),
        }))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Adapter for FileAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::File
    }

    fn mode(&self) -> AdapterMode {
        self.mode
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Initialized FILE adapter ({}, pattern {})",
            self.settings.directory.display(),
            self.settings.file_pattern
        );
        Ok(())
    }

    async fn test_connection(&self) -> AdapterOperationResult {
        match tokio::fs::metadata(&self.settings.directory).await {
            Ok(meta) if meta.is_dir() => AdapterOperationResult::success(format!(
                "Directory {} is accessible",
                self.settings.directory.display()
            )),
            Ok(_) => AdapterOperationResult::failure(format!(
                "{} is not a directory",
                self.settings.directory.display()
            )),
            Err(e) => AdapterOperationResult::failure(format!(
                "Directory {} is not accessible: {}",
                self.settings.directory.display(),
                e
            )),
        }
    }

    async fn execute(
        &self,
        ctx: &AdapterExecutionContext,
    ) -> Result<AdapterExecutionResult, AdapterError> {
        ensure_initialized(self)?;
        let start = Instant::now();

        let output = match self.mode {
            AdapterMode::Inbound => self.collect_files().await?,
            AdapterMode::Outbound => self.write_payload(ctx).await?,
        };

        Ok(AdapterExecutionResult::success(ctx, output)
            .with_elapsed(start.elapsed().as_millis() as u64))
    }

    async fn shutdown(&self) -> Result<(), AdapterError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
