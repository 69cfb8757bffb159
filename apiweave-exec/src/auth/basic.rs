use std::collections::BTreeMap;

use base64::Engine as _;

use crate::api::Api;
use crate::error::ExecError;

pub const VARIABLE_BASIC_USER: &str = "authType-basic-username";
pub const VARIABLE_BASIC_PASSWORD: &str = "authType-basic-password";
pub const VARIABLE_BEARER_TOKEN: &str = "authType-bearer-token";

pub async fn initialize_basic(api: &Api) -> Result<(), ExecError> {
    api.variables
        .declare(VARIABLE_BASIC_USER, true, false, false, None)
        .await?;
    api.variables
        .declare(VARIABLE_BASIC_PASSWORD, true, false, true, None)
        .await
}

pub async fn initialize_bearer(api: &Api) -> Result<(), ExecError> {
    api.variables
        .declare(VARIABLE_BEARER_TOKEN, true, false, true, None)
        .await
}

pub fn basic_headers(api: &Api) -> Result<BTreeMap<String, String>, ExecError> {
    let user = api.variables.get(VARIABLE_BASIC_USER).unwrap_or_default();
    let password = api
        .variables
        .get(VARIABLE_BASIC_PASSWORD)
        .unwrap_or_default();
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    Ok(BTreeMap::from([(
        "Authorization".to_string(),
        format!("Basic {encoded}"),
    )]))
}

pub fn bearer_headers(api: &Api) -> Result<BTreeMap<String, String>, ExecError> {
    let token = api.variables.get(VARIABLE_BEARER_TOKEN).unwrap_or_default();
    Ok(BTreeMap::from([(
        "Authorization".to_string(),
        format!("Bearer {token}"),
    )]))
}
