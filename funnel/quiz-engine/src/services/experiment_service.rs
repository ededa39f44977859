use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::record_assignment;
use crate::models::{Assignment, Variant};
use crate::services::backend_client::FunnelBackend;
use crate::services::spawn_best_effort;
use crate::storage::ClientStorage;

pub const ASSIGNMENT_KEY_PREFIX: &str = "ab_assignment_";

fn assignment_key(quiz_id: &str) -> String {
    format!("{}{}", ASSIGNMENT_KEY_PREFIX, quiz_id)
}

/// Stable bucket for a (session, quiz) pair.
fn bucket(session_id: &str, quiz_id: &str) -> u64 {
    let digest = Sha256::digest(format!("{}_{}", session_id, quiz_id).as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Deterministically pick a variant for a session.
///
/// Inactive variants are skipped and the rest are ordered by id. When every
/// variant carries a traffic percentage the bucket is matched against the
/// cumulative weights; otherwise traffic is split evenly.
pub fn pick_variant<'a>(
    session_id: &str,
    quiz_id: &str,
    variants: &'a [Variant],
) -> Option<&'a Variant> {
    let mut candidates: Vec<&Variant> = variants.iter().filter(|v| v.is_active).collect();
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by_key(|v| v.id);

    let bucket = bucket(session_id, quiz_id);

    let weights: Option<Vec<u64>> = candidates
        .iter()
        .map(|v| v.traffic_percentage.map(u64::from))
        .collect();
    let total: u64 = weights.as_deref().map(|w| w.iter().sum()).unwrap_or(0);

    match weights {
        Some(weights) if total > 0 => {
            let point = bucket % total;
            let mut cumulative = 0;
            for (variant, weight) in candidates.iter().zip(weights) {
                cumulative += weight;
                if point < cumulative {
                    return Some(*variant);
                }
            }
            candidates.first().copied()
        }
        _ => {
            let index = (bucket % candidates.len() as u64) as usize;
            candidates.get(index).copied()
        }
    }
}

/// A session's assignment together with the variant row it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVariant {
    pub assignment: Assignment,
    /// None when the variant list could not be fetched or no longer has it.
    pub variant: Option<Variant>,
}

pub struct ExperimentService {
    storage: Arc<dyn ClientStorage>,
    backend: Arc<dyn FunnelBackend>,
}

impl ExperimentService {
    pub fn new(storage: Arc<dyn ClientStorage>, backend: Arc<dyn FunnelBackend>) -> Self {
        Self { storage, backend }
    }

    /// Locally stored assignment for a quiz. Never touches the network.
    pub fn current_assignment(&self, quiz_id: &str) -> Option<Assignment> {
        let raw = match self.storage.get_item(&assignment_key(quiz_id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read assignment for quiz '{}': {}", quiz_id, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(assignment) => Some(assignment),
            Err(e) => {
                warn!("Ignoring corrupt assignment for quiz '{}': {}", quiz_id, e);
                None
            }
        }
    }

    /// Assign once per (session, quiz); later calls return the stored record.
    ///
    /// A fresh assignment is persisted and reported to the backend in the
    /// background. An empty variant list assigns nothing and touches nothing.
    pub fn assign_variant(
        &self,
        session_id: &str,
        quiz_id: &str,
        variants: &[Variant],
    ) -> Option<Assignment> {
        if variants.is_empty() {
            record_assignment("no_variants");
            return None;
        }

        if let Some(existing) = self.current_assignment(quiz_id) {
            record_assignment("existing");
            return Some(existing);
        }

        let Some(variant) = pick_variant(session_id, quiz_id, variants) else {
            record_assignment("no_variants");
            return None;
        };

        let assignment = Assignment {
            session_id: session_id.to_string(),
            quiz_id: quiz_id.to_string(),
            variant_id: variant.id,
            variant_name: variant.variant_name.clone(),
        };

        match serde_json::to_string(&assignment) {
            Ok(raw) => {
                if let Err(e) = self.storage.set_item(&assignment_key(quiz_id), &raw) {
                    warn!("Failed to persist assignment for quiz '{}': {}", quiz_id, e);
                }
            }
            Err(e) => warn!("Failed to serialize assignment: {}", e),
        }

        info!(
            "Session {} assigned to variant '{}' of quiz '{}'",
            session_id, assignment.variant_name, quiz_id
        );
        record_assignment("assigned");
        self.report_assignment(assignment.clone());

        Some(assignment)
    }

    /// Fetch the quiz's variants and make sure the session has one of them.
    ///
    /// If the fetch fails, a stored assignment is still returned but without
    /// its variant row, so no content overrides apply.
    pub async fn ensure_assignment(&self, session_id: &str, quiz_id: &str) -> Option<ActiveVariant> {
        let variants = match self.backend.get_variants(quiz_id).await {
            Ok(variants) => variants,
            Err(e) => {
                warn!("Failed to fetch variants for quiz '{}': {}", quiz_id, e);
                return self.current_assignment(quiz_id).map(|assignment| ActiveVariant {
                    assignment,
                    variant: None,
                });
            }
        };
        debug!("Quiz '{}' has {} variants", quiz_id, variants.len());

        let assignment = self.assign_variant(session_id, quiz_id, &variants)?;
        let variant = variants
            .into_iter()
            .find(|v| v.id == assignment.variant_id);

        Some(ActiveVariant {
            assignment,
            variant,
        })
    }

    /// Report a conversion for the stored assignment, if there is one.
    pub fn report_conversion(&self, session_id: &str, quiz_id: &str) -> Option<JoinHandle<()>> {
        self.current_assignment(quiz_id)?;

        let backend = Arc::clone(&self.backend);
        let session_id = session_id.to_string();
        let quiz_id = quiz_id.to_string();
        spawn_best_effort("conversion report", async move {
            match backend.track_conversion(&session_id, &quiz_id).await {
                Ok(()) => debug!("Conversion reported for quiz '{}'", quiz_id),
                Err(e) => warn!("Failed to report conversion for quiz '{}': {}", quiz_id, e),
            }
        })
    }

    pub fn clear_assignment(&self, quiz_id: &str) {
        if let Err(e) = self.storage.remove_item(&assignment_key(quiz_id)) {
            warn!("Failed to clear assignment for quiz '{}': {}", quiz_id, e);
        }
    }

    fn report_assignment(&self, assignment: Assignment) {
        let backend = Arc::clone(&self.backend);
        spawn_best_effort("assignment report", async move {
            if let Err(e) = backend.assign_variant(&assignment).await {
                warn!(
                    "Failed to report assignment for quiz '{}': {}",
                    assignment.quiz_id, e
                );
            }
        });
    }
}
