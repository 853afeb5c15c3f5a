//! Polling of long-running server-side jobs.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::context::ServiceKind;
use crate::errors::{ClientError, ErrorDetail, Result};
use crate::operator::{Operator, RequestSpec};

/// Backoff applied before the second poll.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Cap on the backoff between polls.
const MAX_BACKOFF: Duration = Duration::from_secs(15);

/// Handle to an asynchronous server-side job, as returned by an accepted
/// operation's `Location` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Job identifier (the trailing path segment of the polling endpoint).
    pub id: String,
    /// Absolute polling endpoint.
    pub location: String,
}

impl JobHandle {
    /// Derives a handle from a `Location` header value.
    pub fn from_location(location: &str) -> Result<Self> {
        let id = location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                ClientError::protocol(format!("Location header {} has no job id", location))
            })?;

        Ok(Self {
            id: id.to_string(),
            location: location.to_string(),
        })
    }
}

/// Reported state of a job.
///
/// Terminal states are exactly `succeeded` and `failed`; any other reported
/// state, including unknown or future ones, means the job is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// The job completed successfully.
    Succeeded,
    /// The job terminated in a failure state.
    Failed,
    /// The job has not reached a terminal state; carries the raw state string.
    Running(String),
}

impl JobState {
    /// Returns true for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl<'de> Deserialize<'de> for JobState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Running(raw),
        })
    }
}

/// One observation of a job's status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    /// Reported state.
    pub state: JobState,
    /// Error entries reported alongside a failed state.
    #[serde(default, deserialize_with = "deserialize_errors")]
    pub errors: Vec<ErrorDetail>,
}

fn deserialize_errors<'de, D>(deserializer: D) -> std::result::Result<Vec<ErrorDetail>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wire {
        code: Option<serde_json::Value>,
        title: Option<String>,
        detail: Option<String>,
    }

    let entries = Vec::<Wire>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|e| ErrorDetail {
            code: e.code.map(|c| match c {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            title: e.title,
            detail: e.detail.unwrap_or_default(),
        })
        .collect())
}

/// Polls `poll` until the job reaches a terminal state or `timeout` elapses.
///
/// Uses bounded exponential backoff between polls (1 second doubling up to 15
/// seconds). A `failed` state surfaces the server-reported detail and stops
/// polling; exhausting the timeout while still running yields a timeout
/// error, distinct from job failure. Dropping the returned future stops
/// polling without cancelling the server-side job.
pub async fn wait_for_completion<F, Fut>(mut poll: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: futures::Future<Output = Result<JobStatus>>,
{
    let started = tokio::time::Instant::now();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let status = poll().await?;
        match status.state {
            JobState::Succeeded => return Ok(()),
            JobState::Failed => {
                tracing::warn!("job terminated in a failure state");
                return Err(ClientError::JobFailed {
                    errors: status.errors,
                });
            }
            JobState::Running(state) => {
                tracing::debug!(%state, "job still running");
            }
        }

        let elapsed = started.elapsed();
        if elapsed + backoff > timeout {
            return Err(ClientError::Timeout { elapsed });
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Waits for a job obtained from an accepted controller operation.
pub async fn wait_for_job(
    operator: &Operator,
    handle: &JobHandle,
    timeout: Duration,
) -> Result<()> {
    wait_for_completion(
        || {
            operator.execute::<JobStatus>(
                ServiceKind::CloudController,
                RequestSpec::get(["v2", "jobs", handle.id.as_str()]),
            )
        },
        timeout,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn status(state: &str) -> JobStatus {
        serde_json::from_value(serde_json::json!({ "state": state })).unwrap()
    }

    #[test]
    fn handle_from_location_takes_the_trailing_segment() {
        let handle =
            JobHandle::from_location("https://api.example.com/v2/jobs/abc-123").unwrap();
        assert_eq!(handle.id, "abc-123");

        assert!(JobHandle::from_location("/").is_err());
    }

    #[test]
    fn unknown_states_count_as_running() {
        assert_eq!(status("queued").state, JobState::Running("queued".to_string()));
        assert_eq!(
            status("quantum_flux").state,
            JobState::Running("quantum_flux".to_string())
        );
        assert!(status("succeeded").state.is_terminal());
        assert!(status("FAILED").state.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_surfaces_detail_and_stops_polling() {
        let polls = Arc::new(AtomicU32::new(0));
        let poll = {
            let polls = Arc::clone(&polls);
            move || {
                let count = polls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(match count {
                        0 | 1 => status("queued"),
                        _ => serde_json::from_value(serde_json::json!({
                            "state": "failed",
                            "errors": [{"code": 190001, "title": "StagingError", "detail": "buildpack not found"}],
                        }))
                        .unwrap(),
                    })
                }
            }
        };

        let result = wait_for_completion(poll, Duration::from_secs(60)).await;

        match result {
            Err(ClientError::JobFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].detail, "buildpack not found");
            }
            other => panic!("expected job failure, got {:?}", other),
        }
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn job_that_never_terminates_times_out() {
        let polls = Arc::new(AtomicU32::new(0));
        let poll = {
            let polls = Arc::clone(&polls);
            move || {
                polls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(status("running")) }
            }
        };

        let result = wait_for_completion(poll, Duration::from_secs(5)).await;

        assert!(matches!(result, Err(ClientError::Timeout { .. })));
        assert!(polls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeded_job_completes() {
        let polls = Arc::new(AtomicU32::new(0));
        let poll = {
            let polls = Arc::clone(&polls);
            move || {
                let count = polls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if count < 1 {
                        status("running")
                    } else {
                        status("succeeded")
                    })
                }
            }
        };

        wait_for_completion(poll, Duration::from_secs(60)).await.unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }
}
