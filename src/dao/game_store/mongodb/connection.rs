use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::{MongoDaoError, MongoResult};

const PING_ATTEMPTS: u32 = 10;
const FIRST_PING_BACKOFF: Duration = Duration::from_millis(250);
const MAX_PING_BACKOFF: Duration = Duration::from_secs(5);

/// Build a client for `database_name` and wait until the server answers a ping.
///
/// Gives up after [`PING_ATTEMPTS`] pings; the storage supervisor then retries
/// the whole connection with its own backoff.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut backoff = FIRST_PING_BACKOFF;
    let mut attempt = 1;
    loop {
        let err = match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => {
                debug!(database = database_name, attempt, "MongoDB answered ping");
                return Ok((client, database));
            }
            Err(err) => err,
        };
        if attempt >= PING_ATTEMPTS {
            return Err(MongoDaoError::InitialPing {
                attempts: attempt,
                source: err,
            });
        }
        warn!(
            database = database_name,
            attempt,
            wait_ms = backoff.as_millis(),
            error = %err,
            "MongoDB ping failed while connecting; retrying"
        );
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_PING_BACKOFF);
        attempt += 1;
    }
}
