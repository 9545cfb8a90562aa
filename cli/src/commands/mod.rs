mod alerts;
mod day;
mod goals;
mod helpers;
mod import;
mod summary;
mod sync;

pub(crate) use alerts::cmd_alerts;
pub(crate) use day::{cmd_history, cmd_status, cmd_today, cmd_week};
pub(crate) use goals::cmd_goals;
pub(crate) use import::{cmd_import, cmd_log};
pub(crate) use summary::{cmd_summary, cmd_weekly};
pub(crate) use sync::{cmd_check, cmd_sync};
