use futures::stream::{self, StreamExt};
use log::{error, info};

use crate::content_scanner::{scan_message_guarded, ScanOutcome};
use crate::mail_reader::error::ProviderError;
use crate::mail_reader::gmail::MailProvider;
use crate::mail_reader::message::{MessageId, MessageRef};
use crate::settings::ScannerConfig;
use crate::telemetry::MetricsSink;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub account: String,
    pub dispatched: usize,
    pub scanned: usize,
    pub skipped: usize,
    pub findings: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: ScanOutcome) {
        match outcome {
            ScanOutcome::Scanned { findings } => {
                self.scanned += 1;
                self.findings += findings;
            }
            ScanOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// The mailbox owner's address, or an empty string when the profile lookup
/// fails. A failure here does not stop the run.
pub async fn get_users_email<P: MailProvider>(provider: &P, metrics: &dyn MetricsSink) -> String {
    metrics.increment("gmail.users.getProfile.calls", &[]);
    match provider.get_profile().await {
        Ok(profile) => profile.email_address,
        Err(e) => {
            metrics.increment("gmail.users.getProfile.fails", &[]);
            match e.code() {
                Some(code) => {
                    let code = code.to_string();
                    metrics.increment("gmail.users.getProfile.fails.code", &[("code", code.as_str())]);
                    error!("getProfile failed ({}): {}", code, e);
                }
                None => error!("getProfile failed: {}", e),
            }
            String::new()
        }
    }
}

/// Every message id in the mailbox, following page tokens. The estimate is
/// the one reported with the first page.
pub async fn list_message_ids<P: MailProvider>(
    provider: &P,
    include_spam_trash: bool,
) -> Result<(u64, Vec<MessageId>), ProviderError> {
    let first = provider.list_messages(include_spam_trash, None).await?;
    let estimate = first.result_size_estimate;
    let mut ids = first.messages;
    let mut page_token = first.next_page_token;

    while let Some(token) = page_token.take() {
        let page = provider.list_messages(include_spam_trash, Some(&token)).await?;
        ids.extend(page.messages);
        page_token = page.next_page_token;
    }

    Ok((estimate, ids))
}

/// List the mailbox and scan every message, at most
/// `max_concurrent_scans` at a time. Returns once all scans finished.
pub async fn scan_mailbox<P: MailProvider>(
    provider: &P,
    metrics: &dyn MetricsSink,
    config: &ScannerConfig,
    include_spam_trash: bool,
) -> Result<RunSummary, ProviderError> {
    let account = get_users_email(provider, metrics).await;

    metrics.increment("gmail.users.messages.list.calls", &[]);
    let (estimate, ids) = match list_message_ids(provider, include_spam_trash).await {
        Ok(listing) => listing,
        Err(e) => {
            metrics.increment("gmail.users.messages.list.fails", &[]);
            error!("The API returned an error: {}", e);
            return Err(e);
        }
    };

    metrics.gauge("message.count", estimate as f64, &[("account", account.as_str())]);

    let mut summary = RunSummary { account: account.clone(), ..Default::default() };
    if estimate == 0 || ids.is_empty() {
        info!("No messages found.");
        return Ok(summary);
    }

    summary.dispatched = ids.len();
    info!("Scanning {} messages of {}", ids.len(), account);

    let limit = config.max_concurrent_scans.max(1);
    let summary = stream::iter(ids)
        .map(|id| scan_message_guarded(provider, metrics, MessageRef::new(id, &account)))
        .buffer_unordered(limit)
        .fold(summary, |mut summary, outcome| async move {
            summary.record(outcome);
            summary
        })
        .await;

    Ok(summary)
}
