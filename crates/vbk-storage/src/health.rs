//! Bucket reachability check

use anyhow::Result;
use opendal::Operator;

/// Verify the bucket is reachable with the configured credentials by listing its root.
///
/// Run before any packing work so a bad bucket name or key fails fast.
pub async fn check_bucket(op: &Operator) -> Result<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("storage bucket check failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_bucket_is_reachable() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        check_bucket(&op).await.unwrap();
    }
}
