// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Check-in lifecycle service.
//!
//! Owns every interactive state transition: identity verification,
//! submission, facial verification, review, annotation, and the offender
//! setup/deactivation operations. Guards run before any mutation; a guard
//! violation returns a 400-class [`CoreError`] and leaves the store
//! untouched. Notification fan-out runs after the commit and its failures
//! are audit-logged only, never surfaced to the interactive caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    CheckinStatus, DomainEvent, FaceMatchOutcome, OffenderStatus, StorageKey,
};
use crate::error::{CoreError, Result};
use crate::gateways::{CaseDirectory, FaceVerifier, GatewayError, ObjectStore, PersonalDetails};
use crate::notify::{NotificationOrchestrator, Recipients};
use crate::persistence::{
    AuditEventRecord, CheckinEventRecord, CheckinRecord, OffenderRecord, Persistence,
};

/// Interactive lifecycle operations over check-ins and offenders.
pub struct CheckinLifecycleService {
    persistence: Arc<dyn Persistence>,
    case_directory: Arc<dyn CaseDirectory>,
    object_store: Arc<dyn ObjectStore>,
    face_verifier: Arc<dyn FaceVerifier>,
    orchestrator: Arc<NotificationOrchestrator>,
    /// Similarity threshold handed to the facial verification provider.
    face_similarity_threshold: f32,
    /// TTL for presigned upload URLs.
    upload_url_ttl: Duration,
}

/// Presigned upload URLs for one check-in recording.
#[derive(Debug, Clone)]
pub struct CheckinUploadUrls {
    /// Upload URL for the video object.
    pub video: String,
    /// Upload URLs for the snapshot frames, by index.
    pub snapshots: Vec<String>,
}

impl CheckinLifecycleService {
    /// Create a new lifecycle service.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        case_directory: Arc<dyn CaseDirectory>,
        object_store: Arc<dyn ObjectStore>,
        face_verifier: Arc<dyn FaceVerifier>,
        orchestrator: Arc<NotificationOrchestrator>,
        face_similarity_threshold: f32,
        upload_url_ttl: Duration,
    ) -> Self {
        Self {
            persistence,
            case_directory,
            object_store,
            face_verifier,
            orchestrator,
            face_similarity_threshold,
            upload_url_ttl,
        }
    }

    /// Issue presigned upload URLs for a check-in's video and snapshots.
    ///
    /// Only open check-ins accept uploads; the addressing contract is the
    /// `{entity}-{uuid}[-{index}]` key scheme.
    pub async fn issue_upload_urls(
        &self,
        checkin_id: Uuid,
        snapshot_count: u32,
    ) -> Result<CheckinUploadUrls> {
        let checkin = self.load_checkin(checkin_id).await?;
        let status = parse_checkin_status(&checkin)?;
        if status != CheckinStatus::Created {
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: CheckinStatus::Created.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        let video = self
            .object_store
            .presigned_url(&StorageKey::checkin_video(checkin_id), self.upload_url_ttl)
            .await?;

        let mut snapshots = Vec::with_capacity(snapshot_count as usize);
        for index in 0..snapshot_count {
            let url = self
                .object_store
                .presigned_url(
                    &StorageKey::checkin_snapshot(checkin_id, index),
                    self.upload_url_ttl,
                )
                .await?;
            snapshots.push(url);
        }

        Ok(CheckinUploadUrls { video, snapshots })
    }

    // ========================================================================
    // Identity Verification (CREATED → CREATED)
    // ========================================================================

    /// Verify the submitter's identity against the case directory.
    ///
    /// Idempotent: once the `started` phase is stamped, re-verifying is a
    /// no-op. A directory rejection is a validation failure, not an
    /// upstream error.
    pub async fn verify_identity(
        &self,
        checkin_id: Uuid,
        details: &PersonalDetails,
    ) -> Result<()> {
        let checkin = self.load_checkin(checkin_id).await?;
        let status = parse_checkin_status(&checkin)?;
        if status != CheckinStatus::Created {
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: CheckinStatus::Created.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }
        let offender = self.load_offender(checkin.offender_id).await?;

        if self
            .persistence
            .has_checkin_event(checkin_id, "started")
            .await?
        {
            debug!(checkin_id = %checkin_id, "Identity already verified, no-op");
            return Ok(());
        }

        let valid = match self
            .case_directory
            .validate_details(&offender.case_reference, details)
            .await
        {
            Ok(valid) => valid,
            Err(GatewayError::NotFound { .. }) => {
                return Err(CoreError::OffenderNotFound {
                    offender_id: offender.id,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !valid {
            return Err(CoreError::ValidationError {
                field: "personal_details".to_string(),
                message: "details do not match the case record".to_string(),
            });
        }

        self.persistence
            .append_checkin_event(&CheckinEventRecord {
                id: None,
                checkin_id,
                event_type: "started".to_string(),
                note: None,
                occurred_at: Utc::now(),
            })
            .await?;

        info!(checkin_id = %checkin_id, "Check-in identity verified");
        Ok(())
    }

    // ========================================================================
    // Submission (CREATED → SUBMITTED)
    // ========================================================================

    /// Submit the check-in with its survey payload.
    ///
    /// Requires prior identity verification and an uploaded video object.
    /// Resubmission is rejected.
    pub async fn submit(&self, checkin_id: Uuid, survey: serde_json::Value) -> Result<()> {
        let checkin = self.load_checkin(checkin_id).await?;
        let status = parse_checkin_status(&checkin)?;

        if !status.can_submit() {
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: CheckinStatus::Created.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        if !self
            .persistence
            .has_checkin_event(checkin_id, "started")
            .await?
        {
            return Err(CoreError::ValidationError {
                field: "identity".to_string(),
                message: "identity has not been verified for this check-in".to_string(),
            });
        }

        let video_key = StorageKey::checkin_video(checkin_id);
        if !self.object_store.exists(&video_key).await? {
            return Err(CoreError::ValidationError {
                field: "video".to_string(),
                message: "no video has been uploaded for this check-in".to_string(),
            });
        }

        if !self.persistence.submit_checkin(checkin_id, &survey).await? {
            // Lost a race since the status read above.
            let actual = self
                .load_checkin(checkin_id)
                .await
                .map(|c| c.status)
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: CheckinStatus::Created.as_str().to_string(),
                actual,
            });
        }

        let submitted_at = Utc::now();
        self.persistence
            .append_checkin_event(&CheckinEventRecord {
                id: None,
                checkin_id,
                event_type: "submitted".to_string(),
                note: None,
                occurred_at: submitted_at,
            })
            .await?;

        let offender = self.load_offender(checkin.offender_id).await?;
        let time_to_submit = (submitted_at - checkin.created_at).num_seconds();
        self.record_audit(AuditEventRecord {
            id: None,
            event_type: DomainEvent::CheckinSubmitted.event_type().to_string(),
            offender_id: offender.id,
            checkin_id: Some(checkin_id),
            practitioner_id: Some(offender.practitioner_id.clone()),
            time_to_submit_secs: Some(time_to_submit),
            time_to_review_secs: None,
            detail: None,
            created_at: submitted_at,
        })
        .await;

        info!(checkin_id = %checkin_id, "Check-in submitted");

        // Post-commit fan-out; failures are logged, never surfaced.
        if let Err(e) = self
            .orchestrator
            .notify(
                DomainEvent::CheckinSubmitted,
                &offender,
                Some(&checkin),
                None,
                Recipients::OffenderAndPractitioner,
                None,
            )
            .await
        {
            warn!(checkin_id = %checkin_id, error = %e, "Submit notification fan-out failed");
        }

        Ok(())
    }

    // ========================================================================
    // Facial Verification (side operation)
    // ========================================================================

    /// Run the automated face match for the given snapshot indices.
    ///
    /// Requires the offender to be verified and every addressed object to
    /// exist in storage before the provider call is made. The outcome
    /// overwrites any previous result so the submitter can re-record on
    /// NO_MATCH.
    pub async fn verify_face(
        &self,
        checkin_id: Uuid,
        snapshot_indices: &[u32],
    ) -> Result<FaceMatchOutcome> {
        let checkin = self.load_checkin(checkin_id).await?;
        let offender = self.load_offender(checkin.offender_id).await?;
        let offender_status = parse_offender_status(&offender)?;

        if offender_status != OffenderStatus::Verified {
            return Err(CoreError::InvalidOffenderState {
                offender_id: offender.id,
                expected: OffenderStatus::Verified.as_str().to_string(),
                actual: offender_status.as_str().to_string(),
            });
        }

        if snapshot_indices.is_empty() {
            return Err(CoreError::ValidationError {
                field: "snapshots".to_string(),
                message: "at least one snapshot index is required".to_string(),
            });
        }

        // Precondition checks run before the provider call so a missing
        // object never consumes provider quota.
        let reference = StorageKey::reference_photo(offender.id);
        if !self.object_store.exists(&reference).await? {
            return Err(CoreError::ValidationError {
                field: "reference_photo".to_string(),
                message: "no reference photo is held for this offender".to_string(),
            });
        }

        let mut snapshots = Vec::with_capacity(snapshot_indices.len());
        for &index in snapshot_indices {
            let key = StorageKey::checkin_snapshot(checkin_id, index);
            if !self.object_store.exists(&key).await? {
                return Err(CoreError::ValidationError {
                    field: "snapshots".to_string(),
                    message: format!("snapshot {} has not been uploaded", index),
                });
            }
            snapshots.push(key);
        }

        let outcome = self
            .face_verifier
            .compare(&reference, &snapshots, self.face_similarity_threshold)
            .await?;

        self.persistence
            .set_auto_id_check(checkin_id, outcome.as_str())
            .await?;

        info!(
            checkin_id = %checkin_id,
            outcome = outcome.as_str(),
            "Automated face match recorded"
        );

        Ok(outcome)
    }

    // ========================================================================
    // Review (SUBMITTED|EXPIRED → REVIEWED)
    // ========================================================================

    /// Review a submitted or expired check-in.
    ///
    /// The comment is a review note for a submitted check-in and a
    /// reason-not-completed note for an expired one; the audit row type
    /// encodes the predecessor so reporting can tell the two apart.
    pub async fn review(
        &self,
        checkin_id: Uuid,
        comment: &str,
        manual_id_check: Option<FaceMatchOutcome>,
    ) -> Result<()> {
        if comment.trim().is_empty() {
            return Err(CoreError::ValidationError {
                field: "comment".to_string(),
                message: "a review comment is required".to_string(),
            });
        }

        let checkin = self.load_checkin(checkin_id).await?;
        let status = parse_checkin_status(&checkin)?;

        if !status.can_review() {
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: "submitted|expired".to_string(),
                actual: status.as_str().to_string(),
            });
        }

        // Deliberate branch, not duplication: the two predecessors carry
        // different comment semantics and different audit subtypes.
        let (event, note) = match status {
            CheckinStatus::Submitted => (
                DomainEvent::CheckinReviewedAfterSubmission,
                format!("review: {}", comment.trim()),
            ),
            CheckinStatus::Expired => (
                DomainEvent::CheckinReviewedAfterExpiry,
                format!("missed: {}", comment.trim()),
            ),
            _ => unreachable!("guarded by can_review"),
        };

        if !self
            .persistence
            .transition_checkin(
                checkin_id,
                status.as_str(),
                CheckinStatus::Reviewed.as_str(),
            )
            .await?
        {
            let actual = self
                .load_checkin(checkin_id)
                .await
                .map(|c| c.status)
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: status.as_str().to_string(),
                actual,
            });
        }

        let reviewed_at = Utc::now();
        if let Some(outcome) = manual_id_check {
            self.persistence
                .set_manual_id_check(checkin_id, outcome.as_str())
                .await?;
        }

        self.persistence
            .append_checkin_event(&CheckinEventRecord {
                id: None,
                checkin_id,
                event_type: "reviewed".to_string(),
                note: Some(note),
                occurred_at: reviewed_at,
            })
            .await?;

        let phases = self.persistence.get_checkin_phases(checkin_id).await?;
        let review_base = match status {
            CheckinStatus::Submitted => phases.submitted_at,
            _ => phases.expired_at,
        };
        let time_to_review = review_base.map(|base| (reviewed_at - base).num_seconds());

        let offender = self.load_offender(checkin.offender_id).await?;
        self.record_audit(AuditEventRecord {
            id: None,
            event_type: event.event_type().to_string(),
            offender_id: offender.id,
            checkin_id: Some(checkin_id),
            practitioner_id: Some(offender.practitioner_id.clone()),
            time_to_submit_secs: None,
            time_to_review_secs: time_to_review,
            detail: None,
            created_at: reviewed_at,
        })
        .await;

        info!(
            checkin_id = %checkin_id,
            predecessor = status.as_str(),
            "Check-in reviewed"
        );

        if let Err(e) = self
            .orchestrator
            .notify(
                event,
                &offender,
                Some(&checkin),
                None,
                Recipients::PublishOnly,
                None,
            )
            .await
        {
            warn!(checkin_id = %checkin_id, error = %e, "Review event publish failed");
        }

        Ok(())
    }

    // ========================================================================
    // Annotation (REVIEWED|EXPIRED → same state)
    // ========================================================================

    /// Append a free-text follow-up note without a state change.
    pub async fn annotate(&self, checkin_id: Uuid, note: &str) -> Result<()> {
        if note.trim().is_empty() {
            return Err(CoreError::ValidationError {
                field: "note".to_string(),
                message: "an annotation note is required".to_string(),
            });
        }

        let checkin = self.load_checkin(checkin_id).await?;
        let status = parse_checkin_status(&checkin)?;

        if !status.can_annotate() {
            return Err(CoreError::InvalidCheckinState {
                checkin_id,
                expected: "reviewed|expired".to_string(),
                actual: status.as_str().to_string(),
            });
        }

        self.persistence
            .append_checkin_event(&CheckinEventRecord {
                id: None,
                checkin_id,
                event_type: "annotated".to_string(),
                note: Some(note.trim().to_string()),
                occurred_at: Utc::now(),
            })
            .await?;

        debug!(checkin_id = %checkin_id, "Annotation recorded");
        Ok(())
    }

    // ========================================================================
    // Offender Setup & Deactivation
    // ========================================================================

    /// Complete offender setup (INITIAL → VERIFIED).
    ///
    /// Requires the reference photo to be present in storage.
    pub async fn complete_setup(&self, offender_id: Uuid) -> Result<()> {
        let offender = self.load_offender(offender_id).await?;
        let status = parse_offender_status(&offender)?;

        if status != OffenderStatus::Initial {
            return Err(CoreError::InvalidOffenderState {
                offender_id,
                expected: OffenderStatus::Initial.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        let photo = StorageKey::reference_photo(offender_id);
        if !self.object_store.exists(&photo).await? {
            return Err(CoreError::ValidationError {
                field: "reference_photo".to_string(),
                message: "a reference photo must be uploaded before setup completes".to_string(),
            });
        }

        self.persistence
            .update_offender_status(offender_id, OffenderStatus::Verified.as_str())
            .await?;

        self.record_audit(AuditEventRecord {
            id: None,
            event_type: DomainEvent::SetupCompleted.event_type().to_string(),
            offender_id,
            checkin_id: None,
            practitioner_id: Some(offender.practitioner_id.clone()),
            time_to_submit_secs: None,
            time_to_review_secs: None,
            detail: None,
            created_at: Utc::now(),
        })
        .await;

        info!(offender_id = %offender_id, "Offender setup completed");

        if let Err(e) = self
            .orchestrator
            .notify(
                DomainEvent::SetupCompleted,
                &offender,
                None,
                None,
                Recipients::OffenderAndPractitioner,
                None,
            )
            .await
        {
            warn!(offender_id = %offender_id, error = %e, "Setup notification fan-out failed");
        }

        Ok(())
    }

    /// Deactivate an offender (VERIFIED → INACTIVE). Reversible.
    pub async fn deactivate(&self, offender_id: Uuid) -> Result<()> {
        let offender = self.load_offender(offender_id).await?;
        let status = parse_offender_status(&offender)?;

        if status != OffenderStatus::Verified {
            return Err(CoreError::InvalidOffenderState {
                offender_id,
                expected: OffenderStatus::Verified.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        self.persistence
            .update_offender_status(offender_id, OffenderStatus::Inactive.as_str())
            .await?;

        info!(offender_id = %offender_id, "Offender deactivated");
        Ok(())
    }

    /// Reactivate a deactivated offender (INACTIVE → VERIFIED).
    pub async fn reactivate(&self, offender_id: Uuid) -> Result<()> {
        let offender = self.load_offender(offender_id).await?;
        let status = parse_offender_status(&offender)?;

        if status != OffenderStatus::Inactive {
            return Err(CoreError::InvalidOffenderState {
                offender_id,
                expected: OffenderStatus::Inactive.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        self.persistence
            .update_offender_status(offender_id, OffenderStatus::Verified.as_str())
            .await?;

        info!(offender_id = %offender_id, "Offender reactivated");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load_checkin(&self, checkin_id: Uuid) -> Result<CheckinRecord> {
        self.persistence
            .get_checkin(checkin_id)
            .await?
            .ok_or(CoreError::CheckinNotFound { checkin_id })
    }

    async fn load_offender(&self, offender_id: Uuid) -> Result<OffenderRecord> {
        self.persistence
            .get_offender(offender_id)
            .await?
            .ok_or(CoreError::OffenderNotFound { offender_id })
    }

    async fn record_audit(&self, fact: AuditEventRecord) {
        if let Err(e) = self.persistence.insert_audit_event(&fact).await {
            warn!(
                event_type = %fact.event_type,
                offender_id = %fact.offender_id,
                error = %e,
                "Failed to record audit fact"
            );
        }
    }
}

fn parse_checkin_status(checkin: &CheckinRecord) -> Result<CheckinStatus> {
    CheckinStatus::parse(&checkin.status).ok_or_else(|| CoreError::DatabaseError {
        operation: "status".to_string(),
        details: format!("unknown checkin status '{}'", checkin.status),
    })
}

fn parse_offender_status(offender: &OffenderRecord) -> Result<OffenderStatus> {
    OffenderStatus::parse(&offender.status).ok_or_else(|| CoreError::DatabaseError {
        operation: "status".to_string(),
        details: format!("unknown offender status '{}'", offender.status),
    })
}
