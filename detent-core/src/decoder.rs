// Marker Decoder
// Turns runner output lines into run events

use crate::events::RunEvent;
use crate::manifest::{Manifest, MANIFEST_VERSION};
use crate::marker::Marker;

use std::collections::BTreeSet;
use tracing::debug;

/// Runner job status reported for a job that succeeded.
const SUCCESS_STATUS: &str = "success";

/// Stateful line decoder for one run.
///
/// Remembers whether a manifest was seen, so the skip events for jobs
/// overridden to `skip` are emitted exactly once, and counts failed jobs.
#[derive(Debug, Default)]
pub struct MarkerDecoder {
    skipped: Vec<String>,
    manifest_seen: bool,
    failed: BTreeSet<String>,
}

impl MarkerDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that reports the given jobs as skipped once the manifest
    /// arrives. The runner never prints anything for a job whose condition
    /// is `false`.
    pub fn with_skipped(skipped: Vec<String>) -> Self {
        Self {
            skipped,
            ..Self::default()
        }
    }

    /// Decode one line. Non-marker lines come back as output; malformed
    /// markers produce nothing.
    pub fn decode(&mut self, line: &str) -> Vec<RunEvent> {
        let Some(marker) = Marker::parse(line) else {
            if line.contains(crate::marker::MARKER_PREFIX) {
                debug!(line = %line, "dropping malformed marker");
                return Vec::new();
            }
            return vec![RunEvent::output(line.trim_end())];
        };

        match marker {
            Marker::Manifest { payload } => self.decode_manifest(&payload),
            Marker::JobStart { job_id } => vec![RunEvent::job_started(job_id)],
            Marker::StepStart {
                job_id,
                index,
                name,
            } => vec![RunEvent::step_started(job_id, index, name)],
            Marker::JobEnd { job_id, status } => {
                let success = status.eq_ignore_ascii_case(SUCCESS_STATUS);
                if !success {
                    self.failed.insert(job_id.clone());
                }
                vec![RunEvent::job_finished(job_id, success)]
            }
        }
    }

    fn decode_manifest(&mut self, payload: &str) -> Vec<RunEvent> {
        let manifest = match Manifest::decode(payload) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(error = %e, "dropping undecodable manifest");
                return Vec::new();
            }
        };
        if manifest.version != MANIFEST_VERSION {
            debug!(version = manifest.version, "dropping manifest with unknown version");
            return Vec::new();
        }

        let mut events = Vec::with_capacity(1 + self.skipped.len());
        let first = !self.manifest_seen;
        self.manifest_seen = true;

        let skipped: Vec<String> = if first {
            self.skipped
                .iter()
                .filter(|id| manifest.job(id).is_some())
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        events.push(RunEvent::manifest(manifest.jobs));
        events.extend(skipped.into_iter().map(RunEvent::job_skipped));
        events
    }

    /// Number of distinct jobs that ended with a status other than success.
    pub fn failed_jobs(&self) -> usize {
        self.failed.len()
    }

    pub fn manifest_seen(&self) -> bool {
        self.manifest_seen
    }
}
