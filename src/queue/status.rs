use super::MergeQueue;
use crate::error::{Error, Result};
use crate::types::{MergeRequest, MrStatus};

impl MergeQueue {
    /// Full record of a merge request with its dependency summaries and notes
    pub async fn status(&self, id: &str) -> Result<MrStatus> {
        let store = self.store_for(id).await?;
        let issue = store
            .get_issue(id)
            .await
            .map_err(|e| e.context(format!("fetching merge request {id}")))?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let issue_type = issue.issue_type.clone();
        let merge_request = MergeRequest::from_issue(issue);
        Ok(MrStatus {
            display_status: merge_request.display_status(),
            issue_type,
            merge_request,
        })
    }
}
