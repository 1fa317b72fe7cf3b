use fail::fail_point;

use crate::bail;
use crate::error::{BulkResult, ErrorKind};

pub const PROCESS_RECORD_BEFORE_SAVE_FP: &str = "process_record.before_save";
pub const BATCH_BEFORE_FINISHED_FP: &str = "batch.before_finished";
pub const QUEUE_CHECK_IN_FP: &str = "queue.check_in";

pub fn bulk_fail_point(name: &str) -> BulkResult<()> {
    fail_point!(name, |parameter| {
        let mut error_kind = ErrorKind::FailpointTriggered;
        if let Some(parameter) = parameter {
            error_kind = match parameter.as_str() {
                "store" => ErrorKind::StoreQueryFailed,
                "lease" => ErrorKind::LeaseConflict,
                _ => ErrorKind::FailpointTriggered,
            }
        }

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
