pub mod authorized_keys;
pub mod background;
pub mod cleanup;
pub mod compute;
pub mod error;
pub mod id_codec;
pub mod keypair;
pub mod matching;
pub mod retry;
pub mod service;
pub mod session;
pub mod utils;

pub use authorized_keys::{to_authorized_keys_format, KeyFormatError};
pub use background::{retry_detached, tokio_spawner, TaskSpawner, TokioSpawner};
pub use cleanup::{best_effort, log_reporter, CleanupReporter, LogReporter, RecordingReporter};
pub use compute::*;
pub use error::{ComputeError, ErrorKind, Result, ResultExt};
pub use id_codec::{ImageNamespace, NamespacedId};
pub use keypair::{create_with_imported_key, import_public_key, KeypairService};
pub use matching::{get_matching_flavor_id, get_matching_image_id, match_flavor};
pub use retry::{confirm, Exhaustion, PollStatus, RetryPolicy};
pub use service::*;
pub use session::SessionCache;
