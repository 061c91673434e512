//! Report upload.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::remote::{RawReport, RawReportEvent, RemoteSession};
use crate::session::SessionBody;
use nubz_common::{Result, ServerReportId};
use nubz_report::{ReadyReports, Report};

/// Session body uploading every report waiting in the ready queue.
///
/// A report without a remote id gets one first, recorded in the store
/// before any content is sent. A failure aborts the batch; reports already
/// acknowledged have left the queue, so a retry sends only the rest.
/// Batches on the same queue run one at a time.
pub struct UploadReports {
    ready: Arc<ReadyReports>,
}

impl UploadReports {
    pub fn new(ready: Arc<ReadyReports>) -> Self {
        Self { ready }
    }
}

/// Wire form of `report`.
pub fn translate_report(report: &Report, server_id: ServerReportId) -> RawReport {
    RawReport {
        report_id: server_id,
        history: report
            .history()
            .iter()
            .map(|event| RawReportEvent {
                actions: event.actions.clone(),
                duration_in_secs: event.duration_secs,
                exhibit_id: event.exhibit_id,
            })
            .collect(),
    }
}

#[async_trait]
impl SessionBody for UploadReports {
    fn name(&self) -> &str {
        "upload-reports"
    }

    async fn perform_in_session(&self, session: &mut dyn RemoteSession) -> Result<()> {
        let _upload = self.ready.lock_upload().await;
        for pending in self.ready.all_ready().await {
            let id = pending.report.id();
            let server_id = match pending.server_id {
                Some(server_id) => server_id,
                None => {
                    let server_id = session.get_id_for_new_report().await?;
                    self.ready.set_server_id(id, server_id).await?;
                    server_id
                }
            };

            info!(report = %id, %server_id, "Sending report");
            session
                .save_report(translate_report(&pending.report, server_id))
                .await?;
            self.ready.mark_as_sent(id).await?;
        }
        Ok(())
    }
}
