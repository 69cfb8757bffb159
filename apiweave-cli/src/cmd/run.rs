use std::path::Path;
use std::sync::Arc;

use apiweave_exec::{ApiRegistry, EngineContext, NoopScriptBridge};
use apiweave_store::{ApiConfigRecord, MemoryRecordStore, MemoryTagStore, RecordStore, VariableRecord};
use tracing::info;

use crate::exit_codes;
use crate::output::print_error;
use crate::{EngineArgs, OutputArgs};

/// Run one configuration with in-memory stores until ctrl-c.
pub async fn run_cmd(path: &Path, name: &str, engine: EngineArgs, output: OutputArgs) -> i32 {
    let configuration = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to read {}: {e}", path.display()),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let records = Arc::new(MemoryRecordStore::new());
    let tags = Arc::new(MemoryTagStore::new());

    let api_id = 1;
    for var in &engine.variables {
        let Some((key, value)) = var.split_once('=') else {
            print_error(
                output.format,
                output.quiet,
                &format!("invalid --var '{var}', expected NAME=VALUE"),
            );
            return exit_codes::RUNTIME_ERROR;
        };
        let record = VariableRecord {
            api_id,
            key: key.to_string(),
            value: Some(value.to_string()),
            required: false,
            hidden: false,
            sensitive: false,
        };
        if let Err(e) = records.upsert_variable(record).await {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
    }

    records
        .put_api_config(ApiConfigRecord {
            id: api_id,
            name: name.to_string(),
            enabled: true,
            configuration,
        })
        .await;

    let ctx = Arc::new(EngineContext {
        tags: tags.clone(),
        records,
        scripts: Arc::new(NoopScriptBridge),
        base_url: engine.base_url.clone(),
        data_dir: engine.data_dir.clone(),
        license_expired: false,
        http: None,
    });

    let registry = ApiRegistry::new(ctx);
    if let Err(e) = registry.start().await {
        print_error(output.format, output.quiet, &e.to_string());
        return exit_codes::RUN_FAILED;
    }

    match registry.api(api_id).await {
        Some(api) => {
            let status = api.status().await;
            info!(api = %api.name, status = status.display(), "engine running, ctrl-c to stop");
            if status == apiweave_exec::ApiStatus::MissingVariables {
                for (name, value, required) in api.variables.visible() {
                    if required && value.is_none() {
                        info!(variable = %name, "required variable has no value; set it with --var");
                    }
                }
            }
            info!(functions = %api.functions_status(), "function health");
            let webhooks = api.webhooks_status();
            if !webhooks.is_empty() {
                info!(webhooks = %webhooks, "webhook health");
            }
        }
        None => {
            print_error(output.format, output.quiet, "instance failed to start");
            return exit_codes::RUN_FAILED;
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
    registry.shutdown().await;
    exit_codes::SUCCESS
}
