use bytes::Bytes;
use tracing::info;

use creditflow_core::activity::Activity;
use creditflow_core::attachment::{
    extension_of, is_previewable, mime_type, Attachment, AttachmentFilter, AttachmentListing,
    FileKind, UploadFile, UploadLimits, UploadOutcome, MAX_BATCH_FILES,
};
use creditflow_core::identity::Identity;
use creditflow_db::NewAttachment;
use creditflow_store::blob_key;

use crate::{sha256_hex, ActivityService, ServiceError};

/// Bytes of a stored file together with the headers a download response
/// needs.
#[derive(Debug)]
pub struct FileContent {
    pub data: Bytes,
    pub file_name: String,
    pub content_type: &'static str,
}

impl ActivityService {
    pub async fn upload_attachment(
        &self,
        identity: &Identity,
        activity_id: &str,
        original_name: &str,
        description: &str,
        data: Bytes,
    ) -> Result<Attachment, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        ensure_can_upload(identity, &activity)?;

        let limits = UploadLimits::single();
        let stored = self
            .store_one(
                identity,
                activity_id,
                &limits,
                original_name,
                description,
                data,
            )
            .await?;
        info!(
            activity_id = %activity_id,
            attachment_id = %stored.id,
            digest = %stored.digest,
            "attachment uploaded"
        );
        Ok(stored)
    }

    /// Upload several files at once. Each file succeeds or fails on its
    /// own; the response carries one outcome per input file.
    pub async fn batch_upload_attachments(
        &self,
        identity: &Identity,
        activity_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Vec<UploadOutcome>, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        ensure_can_upload(identity, &activity)?;

        if files.is_empty() {
            return Err(ServiceError::Validation("no files given".into()));
        }
        if files.len() > MAX_BATCH_FILES {
            return Err(ServiceError::Validation(format!(
                "batch upload accepts at most {MAX_BATCH_FILES} files"
            )));
        }

        let limits = UploadLimits::batch();
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = match self
                .store_one(
                    identity,
                    activity_id,
                    &limits,
                    &file.original_name,
                    &file.description,
                    Bytes::from(file.data),
                )
                .await
            {
                Ok(attachment) => UploadOutcome::ok(attachment),
                Err(e) => UploadOutcome::failed(file.original_name, e.to_string()),
            };
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        info!(
            activity_id = %activity_id,
            total = outcomes.len(),
            succeeded,
            "batch upload finished"
        );
        Ok(outcomes)
    }

    pub async fn list_attachments(
        &self,
        identity: &Identity,
        activity_id: &str,
        filter: &AttachmentFilter,
    ) -> Result<AttachmentListing, ServiceError> {
        let activity = self.db.get_activity(activity_id)?;
        self.ensure_can_view(identity, &activity)?;

        let attachments = self.db.list_attachments(activity_id, filter)?;
        let stats = self.db.attachment_stats(activity_id)?;
        Ok(AttachmentListing { attachments, stats })
    }

    pub fn update_attachment_description(
        &self,
        identity: &Identity,
        attachment_id: &str,
        description: &str,
    ) -> Result<Attachment, ServiceError> {
        let attachment = self.db.get_attachment(attachment_id)?;
        ensure_can_modify(identity, &attachment)?;

        Ok(self
            .db
            .update_attachment_description(attachment_id, description)?)
    }

    /// Delete the metadata row, then drop the blob if nothing else on any
    /// activity still references the digest. The remaining reference count
    /// comes out of the soft-delete transaction itself.
    pub async fn delete_attachment(
        &self,
        identity: &Identity,
        attachment_id: &str,
    ) -> Result<(), ServiceError> {
        let attachment = self.db.get_attachment(attachment_id)?;
        ensure_can_modify(identity, &attachment)?;

        let (deleted, remaining) = self.db.soft_delete_attachment(attachment_id)?;
        if remaining == 0 {
            let key = blob_key(&deleted.digest, &deleted.file_type);
            self.store.delete(&key).await?;
            info!(digest = %deleted.digest, "released unreferenced blob");
        }
        info!(attachment_id = %attachment_id, "attachment deleted");
        Ok(())
    }

    /// Fetch the file for download. Counts the download.
    pub async fn download_attachment(
        &self,
        identity: &Identity,
        attachment_id: &str,
    ) -> Result<FileContent, ServiceError> {
        let attachment = self.fetch_visible(identity, attachment_id)?;

        let data = self.read_blob(&attachment).await?;
        let attachment = self.db.increment_download_count(attachment_id)?;
        Ok(FileContent {
            data,
            file_name: attachment.original_name.clone(),
            content_type: mime_type(&attachment.file_type),
        })
    }

    /// Fetch the file for inline preview. Only renderable types; does not
    /// touch the download counter.
    pub async fn preview_attachment(
        &self,
        identity: &Identity,
        attachment_id: &str,
    ) -> Result<FileContent, ServiceError> {
        let attachment = self.fetch_visible(identity, attachment_id)?;
        if !is_previewable(&attachment.file_type) {
            return Err(ServiceError::Validation(format!(
                "{} files cannot be previewed",
                attachment.file_type
            )));
        }

        let data = self.read_blob(&attachment).await?;
        Ok(FileContent {
            data,
            file_name: attachment.original_name.clone(),
            content_type: mime_type(&attachment.file_type),
        })
    }

    /// Validate one file, write its blob and insert the metadata row.
    /// Writing the blob first keeps a failed insert harmless: the orphan
    /// blob is re-adopted by the next upload of the same content.
    async fn store_one(
        &self,
        identity: &Identity,
        activity_id: &str,
        limits: &UploadLimits,
        original_name: &str,
        description: &str,
        data: Bytes,
    ) -> Result<Attachment, ServiceError> {
        if original_name.trim().is_empty() {
            return Err(ServiceError::Validation("file name must not be empty".into()));
        }
        if data.is_empty() {
            return Err(ServiceError::Validation("file is empty".into()));
        }
        if data.len() as u64 > limits.max_size {
            return Err(ServiceError::Validation(format!(
                "file exceeds the {} byte limit",
                limits.max_size
            )));
        }
        let ext = extension_of(original_name);
        if !limits.permits_extension(&ext) {
            return Err(ServiceError::Validation(format!(
                "file type .{ext} is not allowed"
            )));
        }

        let digest = sha256_hex(&data);
        if let Some(existing) = self.db.find_digest_on_activity(activity_id, &digest)? {
            return Err(ServiceError::StateConflict(format!(
                "identical file already attached as {}",
                existing.original_name
            )));
        }

        let key = blob_key(&digest, &ext);
        // Write-once: identical content from another activity already
        // wrote this key.
        if !self.store.exists(&key).await? {
            self.store.put(&key, data.clone()).await?;
        }

        let attachment = self.db.create_attachment(&NewAttachment {
            activity_id,
            file_name: &key,
            original_name,
            file_size: data.len() as i64,
            file_type: &ext,
            file_kind: FileKind::from_extension(&ext),
            description,
            digest: &digest,
            uploaded_by: &identity.user_id,
        })?;
        Ok(attachment)
    }

    fn fetch_visible(
        &self,
        identity: &Identity,
        attachment_id: &str,
    ) -> Result<Attachment, ServiceError> {
        let attachment = self.db.get_attachment(attachment_id)?;
        let activity = self.db.get_activity(&attachment.activity_id)?;
        self.ensure_can_view(identity, &activity)?;
        Ok(attachment)
    }

    async fn read_blob(&self, attachment: &Attachment) -> Result<Bytes, ServiceError> {
        let key = blob_key(&attachment.digest, &attachment.file_type);
        self.store.get(&key).await.map_err(|e| match e {
            creditflow_store::StoreError::NotFound(_) => {
                ServiceError::NotFound(format!("file for attachment {}", attachment.id))
            }
            other => other.into(),
        })
    }
}

fn ensure_can_upload(identity: &Identity, activity: &Activity) -> Result<(), ServiceError> {
    if activity.owner_id == identity.user_id || identity.is_admin() {
        return Ok(());
    }
    Err(ServiceError::Forbidden(
        "only the owner or an admin can upload attachments".into(),
    ))
}

fn ensure_can_modify(identity: &Identity, attachment: &Attachment) -> Result<(), ServiceError> {
    if attachment.uploaded_by == identity.user_id || identity.is_admin() {
        return Ok(());
    }
    Err(ServiceError::Forbidden(
        "only the uploader or an admin can modify an attachment".into(),
    ))
}
