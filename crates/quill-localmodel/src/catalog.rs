//! Model catalog: which models can be managed locally and what their
//! verified artifacts look like.

use serde::{Deserialize, Serialize};

/// One artifact file of a model, with its expected digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    /// File name inside the model directory.
    pub name: String,
    /// Expected SHA-256 digest, lowercase hex.
    pub sha256: String,
    /// Size in bytes, for progress display and disk-space checks.
    pub size_bytes: u64,
}

/// One locally manageable model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Catalog id, also the directory name under the cache dir.
    pub model_id: String,
    /// Hub repository the artifacts are fetched from.
    pub repo: String,
    /// Artifact files that make up the model.
    pub files: Vec<ModelFile>,
}

impl ModelSpec {
    /// Total artifact size in bytes.
    pub fn total_size_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// The set of models the manager knows how to download.
#[derive(Clone, Debug, Default)]
pub struct ModelCatalog {
    specs: Vec<ModelSpec>,
}

impl ModelCatalog {
    /// Catalog with an explicit spec list (tests, custom deployments).
    pub fn new(specs: Vec<ModelSpec>) -> Self {
        Self { specs }
    }

    /// The built-in completion model lineup.
    pub fn builtin() -> Self {
        Self::new(vec![
            ModelSpec {
                model_id: "qwen2.5-0.5b-instruct-q4".into(),
                repo: "Qwen/Qwen2.5-0.5B-Instruct-GGUF".into(),
                files: vec![ModelFile {
                    name: "qwen2.5-0.5b-instruct-q4_k_m.gguf".into(),
                    sha256: "8a4b5a7c0f3f2d1e9b8c7d6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a"
                        .into(),
                    size_bytes: 397_808_512,
                }],
            },
            ModelSpec {
                model_id: "llama-3.2-1b-instruct-q4".into(),
                repo: "bartowski/Llama-3.2-1B-Instruct-GGUF".into(),
                files: vec![ModelFile {
                    name: "Llama-3.2-1B-Instruct-Q4_K_M.gguf".into(),
                    sha256: "1f2e3d4c5b6a79880716253443526170899a8b7c6d5e4f3a2b1c0d9e8f7a6b5c"
                        .into(),
                    size_bytes: 807_694_464,
                }],
            },
        ])
    }

    /// All specs, in catalog order.
    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    /// Find a spec by model id.
    pub fn find(&self, model_id: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|spec| spec.model_id == model_id)
    }
}
