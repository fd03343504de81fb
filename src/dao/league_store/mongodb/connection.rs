use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::error::{MongoDaoError, MongoResult};

/// Quick retries absorbing a server that is still starting; longer outages
/// are left to the storage supervisor backoff.
const PING_ATTEMPTS: u32 = 3;
const PING_RETRY_DELAY: Duration = Duration::from_millis(300);

/// Build a client, wait for the server to answer and check that it can run
/// the multi-document transactions used by round and market commits.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempts = 0;
    let hello = loop {
        attempts += 1;
        match database.run_command(doc! { "hello": 1 }).await {
            Ok(reply) => break reply,
            Err(source) if attempts >= PING_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing { attempts, source });
            }
            Err(err) => {
                debug!(attempts, error = %err, "MongoDB not answering yet");
                sleep(PING_RETRY_DELAY * attempts).await;
            }
        }
    };

    let replicated = hello.contains_key("setName") || matches!(hello.get_str("msg"), Ok("isdbgrid"));
    if !replicated {
        warn!(
            database = database_name,
            "MongoDB is a standalone server; round and market commits need a replica set"
        );
    }

    Ok((client, database))
}
