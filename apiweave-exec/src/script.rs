use async_trait::async_trait;
use tracing::debug;

/// Bridge to an externally hosted code runtime. The engine invokes a named
/// routine with the call result; everything else is the host's business.
#[async_trait]
pub trait ScriptBridge: Send + Sync {
    async fn invoke(
        &self,
        project: Option<&str>,
        routine: &str,
        status_code: u16,
        content_type: &str,
        response: &str,
    ) -> Result<(), String>;
}

/// Default bridge used when no script host is attached.
pub struct NoopScriptBridge;

#[async_trait]
impl ScriptBridge for NoopScriptBridge {
    async fn invoke(
        &self,
        project: Option<&str>,
        routine: &str,
        status_code: u16,
        _content_type: &str,
        _response: &str,
    ) -> Result<(), String> {
        debug!(project = ?project, routine = %routine, status_code, "no script host attached, ignoring");
        Ok(())
    }
}
