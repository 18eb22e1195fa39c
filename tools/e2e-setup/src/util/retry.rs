/*!
   Utilities for retrying test operations.
*/

use core::time::Duration;
use std::thread::sleep;
use tracing::trace;

use crate::error::Error;

/**
   A simplified version of retry logic used for testing.
   We do not need complicated retry logic as we need this
   only to wait for freshly started chains to produce blocks.
*/
pub fn assert_eventually_succeed<R>(
    task_name: &str,
    attempts: u16,
    interval: Duration,
    task: impl Fn() -> Result<R, Error>,
) -> Result<R, Error> {
    for i in 0..attempts {
        match task() {
            Ok(res) => return Ok(res),
            Err(e) => {
                trace!(
                    "retrying task {} that failed with error (attempt {}): {}",
                    task_name,
                    i + 1,
                    e
                );
                sleep(interval)
            }
        }
    }

    Err(Error::retry(task_name.to_string(), attempts))
}
