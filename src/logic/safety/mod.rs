//! Learning Safety Gate
//!
//! Every label that would change DetectorStatistics passes through here
//! first. The pipeline runs three checks in order:
//!
//!   ConflictCheck      - trust hierarchy: human ground truth can never be
//!                        overwritten by an automated validation
//!   ConfirmationCheck  - automated labels need 3 independent confirming
//!                        events before statistics move at all
//!   DecayCheck         - re-validations of a stale key carry a reduced
//!                        confidence factor instead of full weight
//!
//! Every decision is journaled, approved or not. Rollback never edits
//! history: it appends an administrative-override event and reverses the
//! original event's statistics contribution.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::constants::MIN_AUTOMATED_CONFIRMATIONS;
use crate::logic::cache::correlation::staleness_decay;
use crate::logic::cache::DetectionCache;

pub mod audit;
pub mod types;


use audit::{AuditJournal, AuditStats};
use types::{
    ConflictInfo, ConflictResolution, EventStatus, GateError, ValidationEvent, ValidationOutcome,
    ValidationRequest, ValidationVerdict, ValidatorKind,
};

const SECS_PER_DAY: f64 = 86_400.0;

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GateStats {
    pub audit: AuditStats,
    pub conflicts_detected: u64,
}

struct GateInner {
    journal: AuditJournal,
    conflicts_detected: u64,
}

/// The single write path into detector statistics. One mutex serializes
/// all validations, which also gives per-key ordering for free.
pub struct LearningSafetyGate {
    cache: Arc<DetectionCache>,
    inner: Mutex<GateInner>,
}

impl LearningSafetyGate {
    pub fn new(cache: Arc<DetectionCache>) -> Self {
        Self {
            cache,
            inner: Mutex::new(GateInner {
                journal: AuditJournal::new(),
                conflicts_detected: 0,
            }),
        }
    }

    /// Gate whose journal mirrors every event to a JSONL file
    pub fn with_persistence<P: AsRef<std::path::Path>>(
        cache: Arc<DetectionCache>,
        audit_path: P,
    ) -> Self {
        Self {
            cache,
            inner: Mutex::new(GateInner {
                journal: AuditJournal::with_persistence(audit_path),
                conflicts_detected: 0,
            }),
        }
    }

    /// Restore the journal from a prior run. Statistics are NOT replayed:
    /// the cache carries its own snapshot and the journal is the record of
    /// how it got there, not a second source of truth.
    pub fn load_from<P: AsRef<std::path::Path>>(
        cache: Arc<DetectionCache>,
        audit_path: P,
    ) -> Result<Self, GateError> {
        let journal = AuditJournal::load_from(audit_path)?;
        Ok(Self {
            cache,
            inner: Mutex::new(GateInner {
                journal,
                conflicts_detected: 0,
            }),
        })
    }

    // ========================================================================
    // PUBLIC API
    // ========================================================================

    /// Run one validation through the full pipeline. Always returns an
    /// explicit verdict; a label that does not reach the cache comes back
    /// as Rejected or Pending, never as a silent drop.
    pub fn validate(&self, request: ValidationRequest) -> ValidationVerdict {
        let now = Utc::now().timestamp();
        let mut inner = self.inner.lock();

        let mut event = ValidationEvent {
            id: Uuid::new_v4(),
            detector_id: request.detector_id.clone(),
            rule_id: request.rule_id.clone(),
            fingerprint: request.fingerprint.clone(),
            file_type: request.file_type.clone(),
            label: request.label,
            validator: request.validator,
            timestamp: now,
            justification: request.justification.clone(),
            status: EventStatus::Pending,
            confidence_factor: 1.0,
        };
        let mut reasons = Vec::new();
        let mut conflict = None;

        // --- ConflictCheck -------------------------------------------------
        let prior = inner
            .journal
            .latest_approved(&request.fingerprint, &request.rule_id)
            .map(|(idx, e)| (idx, e.clone()));

        let mut supersede_idx = None;
        if let Some((prior_idx, prior_event)) = &prior {
            if prior_event.label != request.label {
                if request.validator.trust_level() <= ValidatorKind::Automated.trust_level()
                    && prior_event.validator.trust_level()
                        > ValidatorKind::Automated.trust_level()
                {
                    // Automated sources bounce off human-trust ground truth,
                    // administrative overrides included
                    conflict = Some(ConflictInfo {
                        prior_event_id: prior_event.id,
                        prior_validator: prior_event.validator,
                        prior_label: prior_event.label,
                        resolution: ConflictResolution::AutomatedRejectedByHuman,
                    });
                    reasons.push(format!(
                        "automated validation cannot overwrite {} ground truth",
                        prior_event.validator.as_str()
                    ));
                    event.status = EventStatus::Rejected;
                    inner.conflicts_detected += 1;
                    let event_id = event.id;
                    inner.journal.append(event);
                    log::warn!(
                        "Rejected automated validation against human label: rule={} fingerprint={}",
                        request.rule_id,
                        request.fingerprint
                    );
                    return ValidationVerdict {
                        outcome: ValidationOutcome::Rejected,
                        event_id,
                        reasons,
                        conflict,
                        confidence_factor: 0.0,
                    };
                }

                let resolution = if request.validator.trust_level()
                    > prior_event.validator.trust_level()
                {
                    ConflictResolution::HumanOverridesAutomated
                } else {
                    ConflictResolution::Superseded
                };
                conflict = Some(ConflictInfo {
                    prior_event_id: prior_event.id,
                    prior_validator: prior_event.validator,
                    prior_label: prior_event.label,
                    resolution,
                });
                reasons.push(format!(
                    "conflicts with prior {} label from {}; prior will be superseded on approval",
                    prior_event.label.as_str(),
                    prior_event.validator.as_str()
                ));
                supersede_idx = Some(*prior_idx);
            }
        }

        // --- ConfirmationCheck ---------------------------------------------
        if request.validator == ValidatorKind::Automated {
            let confirmations = self.pending_confirmations(&inner.journal, &request) + 1;
            if confirmations < MIN_AUTOMATED_CONFIRMATIONS {
                reasons.push(format!(
                    "automated confirmation {} of {}; statistics unchanged",
                    confirmations, MIN_AUTOMATED_CONFIRMATIONS
                ));
                let event_id = event.id;
                inner.journal.append(event);
                return ValidationVerdict {
                    outcome: ValidationOutcome::Pending,
                    event_id,
                    reasons,
                    conflict,
                    confidence_factor: 0.0,
                };
            }
            reasons.push(format!(
                "automated confirmation {} of {}; applying validation",
                confirmations, MIN_AUTOMATED_CONFIRMATIONS
            ));
        }

        // --- DecayCheck ----------------------------------------------------
        let factor = match &prior {
            Some((_, prior_event)) => {
                let elapsed_days = (now - prior_event.timestamp).max(0) as f64 / SECS_PER_DAY;
                let factor = staleness_decay(elapsed_days);
                if factor < 1.0 {
                    reasons.push(format!(
                        "prior validation is {:.0} days old; confidence factor {:.3}",
                        elapsed_days, factor
                    ));
                }
                factor
            }
            None => 1.0,
        };

        // --- Apply ---------------------------------------------------------
        // A disagreement counts as one conflict, resolved here; the pending
        // confirmations leading up to it do not count again.
        if let Some(idx) = supersede_idx {
            inner.conflicts_detected += 1;
            self.supersede(&mut inner, idx);
        }

        self.cache.record_validation(
            &request.detector_id,
            &request.rule_id,
            &request.fingerprint,
            &request.file_type,
            request.label,
            factor,
        );

        event.status = EventStatus::Approved;
        event.confidence_factor = factor;
        let event_id = event.id;
        inner.journal.append(event);

        log::debug!(
            "Validation approved: rule={} fingerprint={} label={} factor={:.3}",
            request.rule_id,
            request.fingerprint,
            request.label.as_str(),
            factor
        );

        ValidationVerdict {
            outcome: ValidationOutcome::Approved,
            event_id,
            reasons,
            conflict,
            confidence_factor: factor,
        }
    }

    /// Reverse a previously approved validation. History stays intact:
    /// the original event is flagged Superseded and an administrative
    /// override asserting the inverse label is appended next to it.
    pub fn rollback(
        &self,
        event_id: Uuid,
        justification: &str,
    ) -> Result<ValidationVerdict, GateError> {
        let now = Utc::now().timestamp();
        let mut inner = self.inner.lock();

        let (idx, original) = match inner.journal.find_by_id(event_id) {
            Some((idx, e)) => (idx, e.clone()),
            None => return Err(GateError::UnknownEvent(event_id)),
        };
        if original.status != EventStatus::Approved
            || original.validator == ValidatorKind::AdministrativeOverride
        {
            return Err(GateError::NotApproved(event_id));
        }

        self.cache.revert_validation(
            &original.detector_id,
            &original.rule_id,
            &original.fingerprint,
            &original.file_type,
            original.label,
        );
        inner.journal.set_status(idx, EventStatus::Superseded)?;

        // The override asserts the inverse label for the record but
        // carries no statistics weight of its own
        let override_event = ValidationEvent {
            id: Uuid::new_v4(),
            detector_id: original.detector_id.clone(),
            rule_id: original.rule_id.clone(),
            fingerprint: original.fingerprint.clone(),
            file_type: original.file_type.clone(),
            label: original.label.inverse(),
            validator: ValidatorKind::AdministrativeOverride,
            timestamp: now,
            justification: format!("rollback of {}: {}", event_id, justification),
            status: EventStatus::Approved,
            confidence_factor: 0.0,
        };
        let override_id = override_event.id;
        inner.journal.append(override_event);

        log::info!(
            "Rolled back validation {}: rule={} fingerprint={}",
            event_id,
            original.rule_id,
            original.fingerprint
        );

        Ok(ValidationVerdict {
            outcome: ValidationOutcome::Approved,
            event_id: override_id,
            reasons: vec![format!("rolled back event {}", event_id)],
            conflict: None,
            confidence_factor: 0.0,
        })
    }

    /// Full journal history for one (fingerprint, rule) key, oldest first
    pub fn history(&self, fingerprint: &str, rule_id: &str) -> Vec<ValidationEvent> {
        let inner = self.inner.lock();
        inner
            .journal
            .events_for_key(fingerprint, rule_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Bounded history for one key, newest first. Review surfaces want the
    /// last few decisions, not the whole journal.
    pub fn recent_history(&self, fingerprint: &str, rule_id: &str) -> Vec<ValidationEvent> {
        let inner = self.inner.lock();
        inner
            .journal
            .recent_for_key(fingerprint, rule_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<ValidationEvent> {
        let inner = self.inner.lock();
        inner.journal.get_recent(limit).into_iter().cloned().collect()
    }

    pub fn stats(&self) -> GateStats {
        let inner = self.inner.lock();
        GateStats {
            audit: inner.journal.stats(),
            conflicts_detected: inner.conflicts_detected,
        }
    }

    pub fn save_audit<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), GateError> {
        let inner = self.inner.lock();
        inner.journal.save_to(path)
    }

    // ========================================================================
    // INTERNAL HELPERS
    // ========================================================================

    /// Confirmations pending for this key+label since the last approval.
    /// Each approval closes a confirmation cycle, so a fourth same-label
    /// event starts counting towards the next one from zero.
    fn pending_confirmations(&self, journal: &AuditJournal, request: &ValidationRequest) -> usize {
        let events = journal.events_for_key(&request.fingerprint, &request.rule_id);
        let mut count = 0;
        for event in events {
            if event.label == request.label
                && event.validator == ValidatorKind::Automated
                && event.status == EventStatus::Approved
            {
                count = 0;
                continue;
            }
            if event.label == request.label
                && event.validator == ValidatorKind::Automated
                && event.status == EventStatus::Pending
            {
                count += 1;
            }
        }
        count
    }

    /// Retire a prior approved event and pull its contribution back out
    /// of the statistics it moved. Administrative overrides never moved
    /// statistics in the first place, so they are only flagged.
    fn supersede(&self, inner: &mut GateInner, idx: usize) {
        let prior = match inner.journal.get(idx) {
            Some(e) => e.clone(),
            None => return,
        };
        if prior.validator != ValidatorKind::AdministrativeOverride {
            self.cache.revert_validation(
                &prior.detector_id,
                &prior.rule_id,
                &prior.fingerprint,
                &prior.file_type,
                prior.label,
            );
        }
        if inner.journal.set_status(idx, EventStatus::Superseded).is_err() {
            log::error!("Failed to supersede journal event {}", prior.id);
        }
        log::info!(
            "Superseded validation {}: rule={} fingerprint={} label={}",
            prior.id,
            prior.rule_id,
            prior.fingerprint,
            prior.label.as_str()
        );
    }
}
