mod actions;
mod auth;
mod common;
mod document;
mod function;
mod schedule;
mod tag;
mod webhook;

pub use actions::{
    ActionSpec, CaseSpec, FunctionActionSpec, FunctionActionType, NamedValueSpec, OperatorSpec,
    RetrySpec, RunIfSpec, ScriptActionSpec, StoreFileActionSpec, TagActionSpec, TagMode,
    VariableActionSpec, WebhookActionSpec,
};
pub use auth::{AuthSpec, GrantType, OAuth2Spec, SessionAuthSpec, TokenAuthSpec, TokenName};
pub use common::{
    AllowedCode, BodySpec, BodyType, DataTypeSpec, HeaderSpec, Method, ParamSpec,
    ResponseFormatSpec, ResponseFormatType, ResponseType, TimeUnitSpec,
};
pub use document::{ApiDocument, VariableSpec};
pub use function::FunctionSpec;
pub use schedule::{parse_cron, ScheduleSpec};
pub use tag::{DerivedSpec, HandlerSpec, RenameSpec, TagSpec, UdtSpec};
pub use webhook::WebhookSpec;
