//! Flow directory loader
//!
//! Load flow definition YAML files from a file or a directory.

use std::path::Path;

use super::flow::FlowDefinition;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}

pub struct FlowLoader;

impl FlowLoader {
    /// Load and validate every flow in `dir`, sorted by flow id
    pub fn load_directory(dir: &Path) -> Result<Vec<FlowDefinition>, LoadError> {
        let mut flows = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() {
                let ext = path.extension().and_then(|e| e.to_str());
                let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

                // engine.yaml holds adapter and tuner settings, not a flow
                if filename == "engine.yaml" || filename == "engine.yml" {
                    continue;
                }

                if ext == Some("yaml") || ext == Some("yml") {
                    flows.push(Self::load_file(&path)?);
                }
            }
        }

        flows.sort_by(|a, b| a.id.cmp(&b.id));
        for pair in flows.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(LoadError::InvalidDefinition(format!(
                    "flow id '{}' is defined more than once in {}",
                    pair[0].id,
                    dir.display()
                )));
            }
        }

        Ok(flows)
    }

    pub fn load_file(path: &Path) -> Result<FlowDefinition, LoadError> {
        let content = std::fs::read_to_string(path)?;
        let flow: FlowDefinition = serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })?;
        flow.validate()?;
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_directory() {
        let dir = tempdir().unwrap();

        fs::write(
            dir.path().join("orders.yaml"),
            r#"
id: orders
outbound_adapter_id: erp-http
"#,
        )
        .unwrap();

        fs::write(
            dir.path().join("invoices.yml"),
            r#"
id: invoices
inbound_adapter_id: invoice-files
targets:
  - id: archive
    adapter_id: archive-files
"#,
        )
        .unwrap();

        fs::write(dir.path().join("engine.yaml"), "adapters: []").unwrap();
        fs::write(dir.path().join("not-a-flow.txt"), "ignored").unwrap();

        let flows = FlowLoader::load_directory(dir.path()).unwrap();
        let ids: Vec<_> = flows.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["invoices", "orders"]);
    }

    #[test]
    fn test_load_file_validates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "id: broken\n").unwrap();

        let err = FlowLoader::load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::InvalidDefinition(_)));
    }

    #[test]
    fn test_duplicate_flow_ids_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), "id: same\noutbound_adapter_id: x\n").unwrap();
        fs::write(dir.path().join("b.yaml"), "id: same\noutbound_adapter_id: y\n").unwrap();

        assert!(matches!(
            FlowLoader::load_directory(dir.path()),
            Err(LoadError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_yaml_error_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "id: [unclosed").unwrap();

        match FlowLoader::load_file(&path) {
            Err(LoadError::Yaml { file, .. }) => assert!(file.ends_with("bad.yaml")),
            other => panic!("expected YAML error, got {:?}", other),
        }
    }
}
