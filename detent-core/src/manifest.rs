// Manifest Encoder
// Merges the job graphs of a batch of documents into one versioned manifest

use crate::graph::DependencyGraph;
use crate::inject::{JobOverride, JobOverrides};
use crate::marker::{is_valid_job_id, Marker};
use crate::sensitivity::SensitivityRules;
use crate::workflow::Workflow;
use crate::CoreResult;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Manifest format version carried in the JSON and the marker tag.
pub const MANIFEST_VERSION: u32 = 2;

/// Payload used when the manifest cannot be serialized.
const EMPTY_MANIFEST_JSON: &str = r#"{"version":2,"jobs":[]}"#;

/// One job as the run-time side sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestJob {
    pub id: String,
    pub name: String,
    pub sensitive: bool,
    /// Reusable workflow reference, when the job calls one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    /// Step display names, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    /// Normalized dependencies
    #[serde(default)]
    pub needs: Vec<String>,
}

impl ManifestJob {
    pub fn is_reusable(&self) -> bool {
        self.uses.is_some()
    }
}

/// Jobs of a whole batch, in deterministic topological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub jobs: Vec<ManifestJob>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::empty()
    }
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            jobs: Vec::new(),
        }
    }

    /// Build the manifest for a batch of documents.
    ///
    /// Documents are visited in path order; when two documents declare the
    /// same job id the later one wins. Jobs with ids that are unsafe to embed
    /// in shell commands are left out.
    pub fn build<P: AsRef<Path>>(documents: &[(P, Workflow)], rules: &SensitivityRules) -> Self {
        let mut sorted: Vec<&(P, Workflow)> = documents.iter().collect();
        sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

        let mut merged: BTreeMap<String, ManifestJob> = BTreeMap::new();

        for (path, workflow) in sorted {
            let path = path.as_ref();
            let graph = DependencyGraph::from_edges(
                workflow
                    .jobs
                    .iter()
                    .filter(|(id, _)| {
                        let valid = is_valid_job_id(id);
                        if !valid {
                            warn!(job = %id, path = %path.display(), "skipping job with invalid id");
                        }
                        valid
                    })
                    .map(|(id, job)| (id.clone(), job.needs.to_vec())),
            );

            for (id, job) in &workflow.jobs {
                if !graph.contains(id) {
                    continue;
                }

                let steps = if job.is_reusable() {
                    Vec::new()
                } else {
                    job.steps().iter().map(|step| step.display_name()).collect()
                };

                let entry = ManifestJob {
                    id: id.clone(),
                    name: job.display_name(id).to_string(),
                    sensitive: rules.is_sensitive(id, job),
                    uses: job.uses.clone(),
                    steps,
                    needs: graph.needs(id).to_vec(),
                };

                if merged.insert(id.clone(), entry).is_some() {
                    debug!(job = %id, path = %path.display(), "job id redefined by a later document");
                }
            }
        }

        let order = DependencyGraph::from_edges(
            merged
                .values()
                .map(|job| (job.id.clone(), job.needs.clone())),
        )
        .topological_order();

        let jobs = order
            .into_iter()
            .filter_map(|id| merged.remove(&id))
            .collect();

        Self {
            version: MANIFEST_VERSION,
            jobs,
        }
    }

    pub fn job(&self, id: &str) -> Option<&ManifestJob> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// JSON, base64 encoded. Falls back to an empty manifest if the JSON
    /// cannot be produced.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize manifest, emitting an empty one");
            EMPTY_MANIFEST_JSON.as_bytes().to_vec()
        });
        STANDARD.encode(json)
    }

    pub fn decode(payload: &str) -> CoreResult<Self> {
        let json = STANDARD.decode(payload.trim())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// The marker that carries this manifest.
    pub fn to_marker(&self) -> Marker {
        Marker::Manifest {
            payload: self.encode(),
        }
    }
}

/// The single job in a batch that emits the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHost {
    /// Source document the job lives in
    pub path: PathBuf,
    pub job_id: String,
    /// Marker line the job prints
    pub marker: Marker,
}

impl ManifestHost {
    /// Choose the host job for a batch.
    ///
    /// The first dependency-free job (documents in path order, ids in
    /// lexicographic order) wins. Reusable jobs, jobs with invalid ids and
    /// jobs forced to skip cannot carry steps that run, so they are never
    /// chosen. Without a dependency-free candidate the first remaining job is
    /// used.
    pub fn select<P: AsRef<Path>>(
        documents: &[(P, Workflow)],
        overrides: &JobOverrides,
        manifest: &Manifest,
    ) -> Option<Self> {
        let mut sorted: Vec<&(P, Workflow)> = documents.iter().collect();
        sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

        let candidates: Vec<(&Path, &str, bool)> = sorted
            .iter()
            .flat_map(|(path, workflow)| {
                workflow
                    .jobs
                    .iter()
                    .filter(|(id, job)| {
                        is_valid_job_id(id)
                            && !job.is_reusable()
                            && overrides.get(id) != JobOverride::Skip
                    })
                    .map(move |(id, job)| (path.as_ref(), id.as_str(), job.needs.is_empty()))
            })
            .collect();

        let (path, job_id, _) = candidates
            .iter()
            .find(|(_, _, free)| *free)
            .or_else(|| candidates.first())?;

        debug!(job = %job_id, path = %path.display(), "manifest assigned");

        Some(Self {
            path: path.to_path_buf(),
            job_id: job_id.to_string(),
            marker: manifest.to_marker(),
        })
    }

    /// Whether this host lives in the given document.
    pub fn is_in(&self, path: &Path) -> bool {
        self.path == path
    }
}
