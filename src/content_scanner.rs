use log::{debug, error, warn};

use crate::mail_reader::error::{ScanError, ScanStage};
use crate::mail_reader::gmail::MailProvider;
use crate::mail_reader::message::{MessageRef, Part};
use crate::telemetry::MetricsSink;

pub const SUSPICIOUS_LINK_METRIC: &str = "content.suspicious.link";

/// MIME types whose bodies are decoded and checked.
const SCANNED_MIME_TYPES: [&str; 2] = ["text/plain", "text/html"];

/// True when the text mentions a link. Plain case-sensitive substring
/// search: `HTTPS://` does not count.
pub fn is_suspicious(content: &str) -> bool {
    content.contains("http://") || content.contains("https://")
}

pub fn is_scanned_mime_type(mime_type: &str) -> bool {
    SCANNED_MIME_TYPES.contains(&mime_type)
}

/// Visit every part of the tree depth-first, parents before children,
/// siblings in provider order.
pub fn walk_parts<'a>(root: &'a Part, mut visit: impl FnMut(&'a Part)) {
    let mut stack = vec![root];
    while let Some(part) = stack.pop() {
        visit(part);
        stack.extend(part.children.iter().rev());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FindingSource {
    Subject,
    Body { mime_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub message_id: String,
    pub thread_id: String,
    pub account: String,
    pub source: FindingSource,
}

impl Finding {
    fn new(message: &MessageRef, source: FindingSource) -> Self {
        Finding {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            account: message.account.clone(),
            source,
        }
    }
}

/// Log the finding and count it. Nothing else keeps it.
pub fn emit_finding(finding: &Finding, metrics: &dyn MetricsSink) {
    warn!(
        "content contains links! message={} thread={} account={} source={:?}",
        finding.message_id, finding.thread_id, finding.account, finding.source
    );
    metrics.increment(
        SUSPICIOUS_LINK_METRIC,
        &[("threadId", finding.thread_id.as_str()), ("account", finding.account.as_str())],
    );
}

/// Check one piece of text, emitting a finding when it matches.
fn scan_content(content: &str, source: FindingSource, message: &MessageRef, metrics: &dyn MetricsSink) -> bool {
    if !is_suspicious(content) {
        return false;
    }
    emit_finding(&Finding::new(message, source), metrics);
    true
}

/// Scan the text parts of one payload tree. Returns the number of findings.
pub fn scan_parts(root: &Part, message: &MessageRef, metrics: &dyn MetricsSink) -> usize {
    let mut findings = 0;
    walk_parts(root, |part| {
        if !is_scanned_mime_type(&part.mime_type) {
            return;
        }
        let content = match part.decode_body() {
            Some(Ok(content)) => content,
            Some(Err(e)) => {
                warn!("Cannot decode {} body of message {}: {}", part.mime_type, message.id, e);
                return;
            }
            None => {
                debug!("Empty {} part in message {}", part.mime_type, message.id);
                return;
            }
        };
        let source = FindingSource::Body { mime_type: part.mime_type.clone() };
        if scan_content(&content, source, message, metrics) {
            findings += 1;
        }
    });
    findings
}

#[derive(Debug)]
pub enum ScanOutcome {
    Scanned { findings: usize },
    Skipped { error: ScanError },
}

/// Fetch a message and its thread and check the subject and every text body.
pub async fn scan_message<P: MailProvider>(
    provider: &P,
    metrics: &dyn MetricsSink,
    message: &mut MessageRef,
) -> Result<usize, ScanError> {
    let fetched = provider.get_message(&message.id).await.map_err(|source| ScanError {
        stage: ScanStage::Message,
        message_id: message.id.clone(),
        source,
    })?;

    let mut findings = 0;
    message.subject = fetched.header("Subject").map(str::to_string);
    if let Some(subject) = &message.subject {
        if scan_content(subject, FindingSource::Subject, message, metrics) {
            findings += 1;
        }
    }

    let thread = provider.get_thread(&message.thread_id).await.map_err(|source| ScanError {
        stage: ScanStage::Thread,
        message_id: message.id.clone(),
        source,
    })?;

    for entry in thread.messages {
        if let Some(payload) = entry.payload {
            findings += scan_parts(&Part::from(payload), message, metrics);
        }
    }

    Ok(findings)
}

/// `scan_message` with failures logged and counted instead of propagated.
pub async fn scan_message_guarded<P: MailProvider>(
    provider: &P,
    metrics: &dyn MetricsSink,
    mut message: MessageRef,
) -> ScanOutcome {
    match scan_message(provider, metrics, &mut message).await {
        Ok(findings) => {
            debug!("Scanned message {} ({} findings)", message.id, findings);
            ScanOutcome::Scanned { findings }
        }
        Err(error) => {
            error!("Skipping message: {}", error);
            let stage = error.stage.to_string();
            let code = error.source.code().map(|code| code.to_string()).unwrap_or_default();
            metrics.increment(
                "scan.skipped",
                &[("stage", stage.as_str()), ("code", code.as_str()), ("account", message.account.as_str())],
            );
            ScanOutcome::Skipped { error }
        }
    }
}
