use std::time::Duration;

use tracing::{info, warn};

use crate::config::Downstream;

const INVALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Ask the downstream API to drop its cached movie data.
///
/// Returns whether the call was acknowledged with a 2xx. Failures are logged only.
pub async fn clear_movie_data_cache(downstream: &Downstream) -> bool {
    let endpoint = downstream.endpoint();
    let result = async {
        let client = reqwest::Client::builder()
            .timeout(INVALIDATION_TIMEOUT)
            .build()?;
        client
            .post(&endpoint)
            .bearer_auth(&downstream.admin_secret)
            .send()
            .await
    }
    .await;

    match result {
        Ok(response) if response.status().is_success() => {
            info!("Successfully cleared movie data cache");
            true
        }
        Ok(response) => {
            warn!(
                "Failed to clear movie data cache: {} returned {}",
                endpoint,
                response.status()
            );
            false
        }
        Err(e) => {
            warn!("Failed to clear movie data cache: {}", e);
            false
        }
    }
}
