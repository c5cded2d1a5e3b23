use chrono::{DateTime, Utc};
use tracing::info;

use creditflow_core::activity::{
    Activity, ActivityFilter, ActivityOverview, ActivityStatus, Category, CreateActivity,
    ReviewDecision, UpdateActivity, MAX_TITLE_LEN,
};
use creditflow_core::attachment::Attachment;
use creditflow_core::detail::CategoryDetail;
use creditflow_core::identity::Identity;
use creditflow_store::blob_key;

use crate::{ActivityService, ServiceError};

/// Most activities one batch create may carry.
pub const MAX_BATCH_CREATE: usize = 10;
/// Most activities one batch update may carry.
pub const MAX_BATCH_UPDATE: usize = 20;

impl ActivityService {
    pub fn create(
        &self,
        identity: &Identity,
        input: &CreateActivity,
    ) -> Result<Activity, ServiceError> {
        validate_create(input)?;
        let activity = self.db.create_activity(&identity.user_id, input)?;
        info!(activity_id = %activity.id, owner = %identity.user_id, "activity created");
        Ok(activity)
    }

    /// All-or-nothing batch create. Validation failures are aggregated per
    /// item and nothing is persisted when any item is bad.
    pub fn batch_create(
        &self,
        identity: &Identity,
        inputs: &[CreateActivity],
    ) -> Result<Vec<Activity>, ServiceError> {
        if inputs.is_empty() {
            return Err(ServiceError::Validation("batch is empty".into()));
        }
        if inputs.len() > MAX_BATCH_CREATE {
            return Err(ServiceError::Validation(format!(
                "batch create accepts at most {MAX_BATCH_CREATE} activities"
            )));
        }

        let mut errors = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            if let Err(e) = validate_create(input) {
                errors.push(format!("item {i}: {e}"));
            }
        }
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors.join("; ")));
        }

        Ok(self.db.create_activities(&identity.user_id, inputs)?)
    }

    pub fn get(&self, identity: &Identity, id: &str) -> Result<ActivityOverview, ServiceError> {
        let activity = self.db.get_activity(id)?;
        self.ensure_can_view(identity, &activity)?;

        let participant_count = self.db.count_participants(id)?;
        let application_count = self.db.count_applications(id)?;
        let detail = self.db.get_activity_detail(id, activity.category)?;

        Ok(ActivityOverview {
            activity,
            participant_count,
            application_count,
            detail,
        })
    }

    /// Students only ever see activities they own or participate in;
    /// teachers and admins list unrestricted.
    pub fn list(
        &self,
        identity: &Identity,
        filter: &ActivityFilter,
    ) -> Result<Vec<Activity>, ServiceError> {
        let mut filter = filter.clone();
        if identity.is_student() {
            filter.visible_to = Some(identity.user_id.clone());
        }
        Ok(self.db.list_activities(&filter)?)
    }

    pub fn update(
        &self,
        identity: &Identity,
        id: &str,
        update: &UpdateActivity,
    ) -> Result<Activity, ServiceError> {
        let activity = self.db.get_activity(id)?;
        self.ensure_can_edit(identity, &activity)?;
        if !identity.is_admin() && activity.status != ActivityStatus::Draft {
            return Err(ServiceError::StateConflict(
                "only draft activities can be edited".into(),
            ));
        }
        validate_update(&activity, update)?;

        Ok(self.db.update_activity(id, update)?)
    }

    /// All-or-nothing batch update. Only draft activities are editable for
    /// non-admin callers; a single conflict rolls everything back.
    pub fn batch_update(
        &self,
        identity: &Identity,
        items: &[(String, UpdateActivity)],
    ) -> Result<Vec<Activity>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::Validation("batch is empty".into()));
        }
        if items.len() > MAX_BATCH_UPDATE {
            return Err(ServiceError::Validation(format!(
                "batch update accepts at most {MAX_BATCH_UPDATE} activities"
            )));
        }

        let mut errors = Vec::new();
        for (i, (id, update)) in items.iter().enumerate() {
            let activity = self.db.get_activity(id)?;
            if let Err(e) = self.ensure_can_edit(identity, &activity) {
                return Err(e);
            }
            if let Err(e) = validate_update(&activity, update) {
                errors.push(format!("item {i}: {e}"));
            }
        }
        if !errors.is_empty() {
            return Err(ServiceError::Validation(errors.join("; ")));
        }

        Ok(self
            .db
            .update_activities(items, !identity.is_admin())?)
    }

    pub fn submit(&self, identity: &Identity, id: &str) -> Result<Activity, ServiceError> {
        let activity = self.db.get_activity(id)?;
        if activity.owner_id != identity.user_id {
            return Err(ServiceError::Forbidden(
                "only the owner can submit an activity".into(),
            ));
        }
        let submitted = self.db.submit_activity(id)?;
        info!(activity_id = %id, "activity submitted for review");
        Ok(submitted)
    }

    pub fn review(
        &self,
        identity: &Identity,
        id: &str,
        decision: ReviewDecision,
        comment: &str,
    ) -> Result<Activity, ServiceError> {
        if !identity.can_review() {
            return Err(ServiceError::Forbidden(
                "only teachers and admins can review activities".into(),
            ));
        }
        let reviewed = self.db.review_activity(
            id,
            decision.resulting_status(),
            &identity.user_id,
            comment,
        )?;
        info!(
            activity_id = %id,
            decision = decision.as_str(),
            reviewer = %identity.user_id,
            "activity reviewed"
        );
        Ok(reviewed)
    }

    pub fn withdraw(&self, identity: &Identity, id: &str) -> Result<Activity, ServiceError> {
        let activity = self.db.get_activity(id)?;
        if activity.owner_id != identity.user_id && !identity.is_admin() {
            return Err(ServiceError::Forbidden(
                "only the owner or an admin can withdraw an activity".into(),
            ));
        }
        let withdrawn = self.db.withdraw_activity(id)?;
        info!(activity_id = %id, "activity withdrawn to draft");
        Ok(withdrawn)
    }

    pub async fn delete(&self, identity: &Identity, id: &str) -> Result<(), ServiceError> {
        let activity = self.db.get_activity(id)?;
        if activity.owner_id != identity.user_id && !identity.can_review() {
            return Err(ServiceError::Forbidden(
                "only the owner, a teacher or an admin can delete an activity".into(),
            ));
        }

        let attachments = self.db.soft_delete_activity(id)?;
        self.release_unreferenced_blobs(&attachments).await?;
        info!(activity_id = %id, "activity deleted");
        Ok(())
    }

    /// All-or-nothing batch delete; blob cleanup happens after the commit.
    pub async fn batch_delete(
        &self,
        identity: &Identity,
        ids: &[String],
    ) -> Result<(), ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::Validation("batch is empty".into()));
        }
        for id in ids {
            let activity = self.db.get_activity(id)?;
            if activity.owner_id != identity.user_id && !identity.can_review() {
                return Err(ServiceError::Forbidden(format!(
                    "not allowed to delete activity {id}"
                )));
            }
        }

        let attachments = self.db.soft_delete_activities(ids)?;
        self.release_unreferenced_blobs(&attachments).await?;
        Ok(())
    }

    /// Students see an activity only as its owner or as a participant.
    pub(crate) fn ensure_can_view(
        &self,
        identity: &Identity,
        activity: &Activity,
    ) -> Result<(), ServiceError> {
        if !identity.is_student() || activity.owner_id == identity.user_id {
            return Ok(());
        }
        if self.db.is_participant(&activity.id, &identity.user_id)? {
            return Ok(());
        }
        Err(ServiceError::Forbidden(
            "no access to this activity".into(),
        ))
    }

    fn ensure_can_edit(
        &self,
        identity: &Identity,
        activity: &Activity,
    ) -> Result<(), ServiceError> {
        if activity.owner_id == identity.user_id || identity.can_review() {
            return Ok(());
        }
        Err(ServiceError::Forbidden(
            "only the owner, a teacher or an admin can edit an activity".into(),
        ))
    }

    /// Drop the blobs of the given attachments when no live metadata row
    /// anywhere still references their digest. Delete is idempotent, so a
    /// concurrent removal of the same blob is harmless.
    pub(crate) async fn release_unreferenced_blobs(
        &self,
        attachments: &[Attachment],
    ) -> Result<(), ServiceError> {
        let mut seen = std::collections::HashSet::new();
        for attachment in attachments {
            if !seen.insert(attachment.digest.clone()) {
                continue;
            }
            if self.db.count_live_digest_references(&attachment.digest)? == 0 {
                let key = blob_key(&attachment.digest, &attachment.file_type);
                self.store.delete(&key).await?;
                info!(digest = %attachment.digest, "released unreferenced blob");
            }
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), ServiceError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation("title must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(ServiceError::Validation(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_dates(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ServiceError::Validation(
                "start date must not be after end date".into(),
            ));
        }
    }
    Ok(())
}

fn validate_detail(category: Category, detail: &CategoryDetail) -> Result<(), ServiceError> {
    if detail.category() != category {
        return Err(ServiceError::Validation(format!(
            "detail payload is for {} but the activity category is {}",
            detail.category().as_str(),
            category.as_str()
        )));
    }
    Ok(())
}

fn validate_create(input: &CreateActivity) -> Result<(), ServiceError> {
    validate_title(&input.title)?;
    validate_dates(input.start_date, input.end_date)?;
    if let Some(ref detail) = input.detail {
        validate_detail(input.category, detail)?;
    }
    Ok(())
}

fn validate_update(activity: &Activity, update: &UpdateActivity) -> Result<(), ServiceError> {
    if let Some(ref title) = update.title {
        validate_title(title)?;
    }

    let start = update.start_date.unwrap_or(activity.start_date);
    let end = update.end_date.unwrap_or(activity.end_date);
    validate_dates(start, end)?;

    let category = update.category.unwrap_or(activity.category);
    if let Some(ref detail) = update.detail {
        validate_detail(category, detail)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use creditflow_core::activity::{
        ActivityStatus, Category, CreateActivity, ReviewDecision, UpdateActivity,
    };
    use creditflow_core::detail::{CategoryDetail, CompetitionDetail};
    use creditflow_core::identity::{Identity, UserType};
    use creditflow_db::Db;
    use creditflow_store::{create_store, StoreConfig};

    use crate::{ActivityService, ServiceError, StaticDirectory};

    fn service(dir: &std::path::Path) -> ActivityService {
        let db = Db::open_in_memory().unwrap();
        let store = create_store(&StoreConfig {
            data_dir: Some(dir.to_string_lossy().to_string()),
        });
        ActivityService::new(db, store, Arc::new(StaticDirectory::new()))
    }

    fn student(id: &str) -> Identity {
        Identity::new(id, UserType::Student)
    }

    fn teacher(id: &str) -> Identity {
        Identity::new(id, UserType::Teacher)
    }

    fn draft(svc: &ActivityService, owner: &Identity) -> creditflow_core::Activity {
        svc.create(
            owner,
            &CreateActivity {
                title: "Entry".into(),
                description: String::new(),
                category: Category::Innovation,
                start_date: None,
                end_date: None,
                detail: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_rejects_empty_title() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let err = svc
            .create(
                &student("s1"),
                &CreateActivity {
                    title: "   ".into(),
                    description: String::new(),
                    category: Category::Innovation,
                    start_date: None,
                    end_date: None,
                    detail: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn create_rejects_mismatched_detail() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let err = svc
            .create(
                &student("s1"),
                &CreateActivity {
                    title: "Entry".into(),
                    description: String::new(),
                    category: Category::Innovation,
                    start_date: None,
                    end_date: None,
                    detail: Some(CategoryDetail::Competition(CompetitionDetail::default())),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn create_rejects_inverted_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let later = chrono::Utc::now();
        let earlier = later - chrono::Duration::days(7);

        let err = svc
            .create(
                &student("s1"),
                &CreateActivity {
                    title: "Entry".into(),
                    description: String::new(),
                    category: Category::Innovation,
                    start_date: Some(later),
                    end_date: Some(earlier),
                    detail: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn update_rejected_once_submitted() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let activity = draft(&svc, &owner);
        svc.submit(&owner, &activity.id).unwrap();

        let err = svc
            .update(
                &owner,
                &activity.id,
                &UpdateActivity {
                    title: Some("New title".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::StateConflict(_)));

        // Nothing changed
        let current = svc.get(&owner, &activity.id).unwrap();
        assert_eq!(current.activity.title, "Entry");
    }

    #[test]
    fn update_rejects_inverted_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let activity = draft(&svc, &owner);
        let later = chrono::Utc::now();
        let earlier = later - chrono::Duration::days(7);

        let err = svc
            .update(
                &owner,
                &activity.id,
                &UpdateActivity {
                    start_date: Some(Some(later)),
                    end_date: Some(Some(earlier)),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let current = svc.get(&owner, &activity.id).unwrap();
        assert!(current.activity.start_date.is_none());
    }

    #[test]
    fn submit_requires_ownership() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let activity = draft(&svc, &owner);

        let err = svc.submit(&student("s2"), &activity.id).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn review_requires_review_permission() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let activity = draft(&svc, &owner);
        svc.submit(&owner, &activity.id).unwrap();

        let err = svc
            .review(&owner, &activity.id, ReviewDecision::Approve, "")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let approved = svc
            .review(&teacher("t1"), &activity.id, ReviewDecision::Approve, "ok")
            .unwrap();
        assert_eq!(approved.status, ActivityStatus::Approved);
    }

    #[test]
    fn students_cannot_view_foreign_activities() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let activity = draft(&svc, &owner);

        let err = svc.get(&student("s2"), &activity.id).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // Teachers are unrestricted
        assert!(svc.get(&teacher("t1"), &activity.id).is_ok());
    }

    #[test]
    fn list_hides_foreign_activities_from_students() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let activity = draft(&svc, &owner);

        let filter = creditflow_core::activity::ActivityFilter::default();
        let foreign = svc.list(&student("s2"), &filter).unwrap();
        assert!(foreign.is_empty());

        let own = svc.list(&owner, &filter).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, activity.id);

        // Teachers list unrestricted
        assert_eq!(svc.list(&teacher("t1"), &filter).unwrap().len(), 1);
    }

    #[test]
    fn batch_create_rejects_oversized_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let input = CreateActivity {
            title: "Entry".into(),
            description: String::new(),
            category: Category::Innovation,
            start_date: None,
            end_date: None,
            detail: None,
        };
        let inputs: Vec<_> = (0..11).map(|_| input.clone()).collect();

        let err = svc.batch_create(&student("s1"), &inputs).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn batch_create_aggregates_item_errors_and_persists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let owner = student("s1");
        let good = CreateActivity {
            title: "Good".into(),
            description: String::new(),
            category: Category::Innovation,
            start_date: None,
            end_date: None,
            detail: None,
        };
        let bad = CreateActivity {
            title: String::new(),
            ..good.clone()
        };

        let err = svc
            .batch_create(&owner, &[good, bad])
            .unwrap_err();
        match err {
            ServiceError::Validation(msg) => assert!(msg.contains("item 1")),
            other => panic!("unexpected error: {other:?}"),
        }

        let listed = svc
            .list(&owner, &creditflow_core::activity::ActivityFilter::default())
            .unwrap();
        assert!(listed.is_empty());
    }
}
