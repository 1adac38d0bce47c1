/// Fatal scan errors. Everything after a successful clone is reported as an
/// [`actready_core::AuditFailure`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to clone {url}: {reason}")]
    Clone { url: String, reason: String },

    #[error("scan workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ScanError {
    pub fn is_clone_error(&self) -> bool {
        matches!(self, Self::Clone { .. })
    }
}
