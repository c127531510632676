/*!
# Overview
cleanup-bucket empties a versioned Amazon S3 bucket and can delete it afterwards.
It is meant for buckets whose version count is too large for the console.

## How a run works
1. The configuration is resolved once, from defaults, the hosting
   instance's tags, environment variables/flags and (serverless) the
   invocation event, in increasing precedence.
2. Every object version and delete marker is enumerated with paginated
   ListObjectVersions requests.
3. The refs are removed with quiet-mode DeleteObjects batches (delete markers
   first, then versions). Per-item failures are recorded, not raised.
4. A sequential DeleteObject repair pass revisits the failed refs (or every
   ref, or none), always by exact version id.
5. An optional second listing reports residual entries, and the bucket is
   deleted when enabled. A non-empty bucket makes that step fail loudly.

Log records can additionally be forwarded to a search service for auditing
(see [`audit`]).

## As a Library
The `cleanup-bucket` CLI and the `cleanup-bucket-lambda` function are thin
wrappers over this library.

```no_run
use std::sync::Arc;

use cleanup_bucket::config::args::parse_from_args;
use cleanup_bucket::{BucketCleanup, Config, create_storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_from_args(["cleanup-bucket", "--bucket-name", "my-bucket"])?;
    let config = Config::try_from(args).map_err(anyhow::Error::msg)?;

    let client_config = config.target_client_config.clone().unwrap();
    let client = Arc::new(client_config.create_client().await);
    let storage = create_storage(&config, client);

    let report = BucketCleanup::new(config, storage).run().await?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod audit;
pub mod cleanup;
pub mod config;
pub mod deleter;
pub mod lister;
pub mod storage;
pub mod tracing_init;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cleanup::{BucketCleanup, CleanupReport};
pub use config::Config;
pub use config::args::{CLIArgs, ConfigOverrides};
pub use storage::create_storage;
pub use types::error::{CleanupError, exit_code_from_error};
