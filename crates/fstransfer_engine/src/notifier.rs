use anyhow::Result;
use async_trait::async_trait;
use fstransfer_contract::TransferRequest;
use tracing::info;

/// Observer of completed transfers, called once per request that reaches
/// `DONE`. A listener error is logged and does not affect the request.
#[async_trait]
pub trait TransferListener: Send + Sync {
    fn name(&self) -> &str;

    async fn transfer_completed(&self, request: &TransferRequest) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LoggingListener;

#[async_trait]
impl TransferListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    async fn transfer_completed(&self, request: &TransferRequest) -> Result<()> {
        info!(
            request_id = request.id,
            old_file_key = %request.old_file_key,
            new_file_key = %request.new_file_key,
            target = %request.target_provider_name,
            "file moved to new provider"
        );
        Ok(())
    }
}
