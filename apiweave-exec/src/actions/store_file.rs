use apiweave_core::types::StoreFileActionSpec;
use apiweave_core::ValueString;
use apiweave_store::StoredFileRecord;
use base64::Engine as _;
use serde_json::json;
use tracing::debug;

use crate::error::ExecError;

use super::{CompileCtx, Dispatch};

/// Decodes the response to a file on disk, generates a random access token
/// and upserts the file record for later retrieval.
pub struct StoreFileAction {
    file_id: ValueString,
    file_name: ValueString,
    extension: String,
    content_type: String,
    path: ValueString,
}

pub const FILE_ENDPOINT: &str = "api-file";

impl StoreFileAction {
    pub fn compile(spec: &StoreFileActionSpec, ctx: CompileCtx<'_>) -> Result<Self, ExecError> {
        Ok(Self {
            file_id: ValueString::parse(&spec.file_id)?,
            file_name: ValueString::parse(&spec.file_name)?,
            extension: spec.extension.clone(),
            content_type: spec.content_type.clone(),
            path: ValueString::parse(spec.path.as_deref().unwrap_or(ctx.function_name))?,
        })
    }

    pub async fn handle(&self, d: &Dispatch<'_>) -> Result<(), ExecError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(d.response.trim())
            .map_err(|e| ExecError::Processing(format!("base64 decode failed: {e}")))?;

        let ctx = d.eval_ctx();
        let file_id = self.file_id.value(&ctx)?;
        let file_name = self.file_name.value(&ctx)?;
        let tag_path = self.path.value(&ctx)?;
        let access_token = generate_access_token();

        let dir = d.api.ctx.data_dir.join(&d.api.name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(ExecError::processing)?;
        let file_path = dir.join(format!("{}.{}", file_name, self.extension));
        tokio::fs::write(&file_path, &bytes)
            .await
            .map_err(ExecError::processing)?;

        debug!(file = %file_path.display(), bytes = bytes.len(), "stored file");

        d.api
            .ctx
            .tags
            .tag_update(
                &format!("{tag_path}/FileURL"),
                json!(format!("/system/{}/{}/{}", FILE_ENDPOINT, d.api.id, access_token)),
            )
            .await?;

        d.api
            .ctx
            .records
            .upsert_file(StoredFileRecord {
                api_id: d.api.id,
                file_id,
                file_name,
                extension: self.extension.clone(),
                content_type: self.content_type.clone(),
                access_token,
                last_update: chrono::Utc::now(),
            })
            .await?;
        Ok(())
    }
}

fn generate_access_token() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..20)
        .map(|_| ALPHABET[fastrand::usize(..ALPHABET.len())] as char)
        .collect()
}
