use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Retries a request closure with exponential backoff, starting at one second.
/// See [`request_with_backoff`].
pub async fn request_with_retry<F, Fut>(
    task: F,
    max_retries: u32,
) -> Result<reqwest::Response, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    request_with_backoff(task, max_retries, DEFAULT_INITIAL_DELAY).await
}

/// Retries a request closure with exponential backoff.
/// Retries on:
/// - Network errors
/// - 429 Too Many Requests (respects Retry-After header)
/// - 5xx Server Errors
///
/// Returns the last Response (even if error status) or the last network error as String.
pub async fn request_with_backoff<F, Fut>(
    mut task: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<reqwest::Response, String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    let mut delay = initial_delay;

    loop {
        attempt += 1;
        match task().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || attempt > max_retries {
                    return Ok(response);
                }

                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    let retry_delay = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(delay)
                        .min(MAX_DELAY);

                    tracing::warn!(
                        "[HTTP] Request failed with status {}, retrying in {:?} (attempt {}/{})",
                        status,
                        retry_delay,
                        attempt,
                        max_retries
                    );
                    tokio::time::sleep(retry_delay).await;
                    delay = std::cmp::min(delay * 2, MAX_DELAY);
                    continue;
                }

                // 400/401/404 and friends will not improve on retry
                return Ok(response);
            }
            Err(e) => {
                if attempt > max_retries {
                    return Err(format!(
                        "Network request failed after {} attempts: {}",
                        attempt, e
                    ));
                }
                tracing::warn!(
                    "[HTTP] Network error: {}, retrying in {:?} (attempt {}/{})",
                    e,
                    delay,
                    attempt,
                    max_retries
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_DELAY);
            }
        }
    }
}
