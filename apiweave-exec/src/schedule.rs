//! Runtime scheduling: each schedule becomes an abortable task owned by its
//! function. Nothing thrown during a run terminates the schedule itself;
//! the next tick always attempts again.

use std::sync::Arc;
use std::time::Duration;

use apiweave_core::condition::compare_json;
use apiweave_core::types::{parse_cron, ScheduleSpec};
use chrono::Utc;
use tracing::{debug, error};

use crate::api::Api;
use crate::executor::execute_blocking;
use crate::function::Function;

pub fn start(api: &Arc<Api>, function: &Arc<Function>) {
    let Some(spec) = function.schedule.clone() else {
        return;
    };

    let handle = match spec {
        ScheduleSpec::Manual => return,
        ScheduleSpec::Timer { duration, unit } => {
            let delay = Duration::from_secs(unit.to_seconds(duration));
            debug!(function = %function.name, delay_secs = delay.as_secs(), "scheduling with fixed delay");
            let api = api.clone();
            let function = function.clone();
            tokio::spawn(async move {
                if delay.is_zero() {
                    // Duration 0 means "run once immediately".
                    execute_blocking(&api, &function, None).await;
                    return;
                }
                loop {
                    execute_blocking(&api, &function, None).await;
                    tokio::time::sleep(delay).await;
                }
            })
        }
        ScheduleSpec::Cron { cron } => {
            let schedule = match parse_cron(&cron) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!(function = %function.name, cron = %cron, error = %e, "invalid cron expression");
                    return;
                }
            };
            debug!(function = %function.name, cron = %cron, "scheduling with cron");
            let api = api.clone();
            let function = function.clone();
            tokio::spawn(async move {
                loop {
                    let Some(next) = schedule.upcoming(Utc).next() else {
                        break;
                    };
                    let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::time::sleep(wait).await;
                    execute_blocking(&api, &function, None).await;
                }
            })
        }
        ScheduleSpec::Tag {
            tag_path,
            operator,
            value,
        } => {
            debug!(function = %function.name, tag_path = %tag_path, "scheduling on value changes");
            let api = api.clone();
            let function = function.clone();
            tokio::spawn(async move {
                let mut subscription = match api.ctx.tags.subscribe(&tag_path).await {
                    Ok(s) => s,
                    Err(e) => {
                        error!(tag_path = %tag_path, error = %e, "error subscribing to tag");
                        return;
                    }
                };
                while let Some(new_value) = subscription.receiver.recv().await {
                    if compare_json(operator, &new_value, &value) {
                        execute_blocking(&api, &function, None).await;
                    }
                }
            })
        }
    };

    function
        .schedule_handles
        .lock()
        .expect("handles lock")
        .push(handle);
}
