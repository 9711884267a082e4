//! Automatic submission when the exam countdown runs out.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use examhall_core::{Connector, Environment};
use examhall_proto::PublishedExam;

use crate::{ClientError, ReconnectingClient, console::AnswerSheet};

/// How long before the published end time the sheet is sent, so it reaches
/// the coordinator before its own countdown closes intake.
pub const AUTO_SUBMIT_LEAD: Duration = Duration::from_secs(2);

/// Answer sheet shared between the console and the event loop.
pub type SharedSheet = Arc<Mutex<AnswerSheet>>;

/// Wait out the countdown of `exam` (less `lead`) and submit the sheet.
///
/// Returns the number of answers sent, or `None` when the sheet moved on to
/// a different exam in the meantime.
pub async fn submit_at_deadline<C: Connector, E: Environment>(
    client: ReconnectingClient<C, E>,
    sheet: SharedSheet,
    exam: PublishedExam,
    env: E,
    lead: Duration,
) -> Result<Option<usize>, ClientError> {
    let remaining = exam.remaining_millis(env.wall_clock_millis());
    let wait = Duration::from_millis(u64::try_from(remaining).unwrap_or(0)).saturating_sub(lead);
    tracing::debug!(exam_id = %exam.exam_id, wait_ms = wait.as_millis(), "auto-submit armed");
    env.sleep(wait).await;

    let answers = {
        let sheet = sheet.lock().unwrap_or_else(PoisonError::into_inner);
        if !sheet.is_for(&exam) {
            return Ok(None);
        }
        sheet.answers()
    };

    let count = answers.len();
    tracing::info!(exam_id = %exam.exam_id, count, "countdown over, submitting answer sheet");
    client.submit_answers(answers)?;
    Ok(Some(count))
}
