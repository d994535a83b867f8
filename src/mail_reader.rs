use anyhow::Result;
use log::info;

pub mod auth;
pub mod error;
pub mod gmail;
pub mod message;

use crate::enumerator::scan_mailbox;
use crate::settings::Config;
use crate::telemetry;

pub async fn main(config: &Config) -> Result<()> {
    let metrics = telemetry::build_sink(&config.telemetry)?;

    let result = async {
        let token = auth::authorize(&config.gmail, metrics.as_ref()).await?;
        let client = gmail::GmailClient::new(&config.gmail, token.access_token)?;
        let summary = scan_mailbox(&client, metrics.as_ref(), &config.scanner, config.gmail.include_spam_trash).await?;
        info!(
            "Scan of {} finished: {} dispatched, {} scanned, {} skipped, {} findings",
            summary.account, summary.dispatched, summary.scanned, summary.skipped, summary.findings
        );
        anyhow::Ok(())
    }
    .await;

    metrics.flush();
    result
}
