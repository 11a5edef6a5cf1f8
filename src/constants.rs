// PlantScope Constants
// Storage keys are shared with older app builds. Do not rename them.

// Data directory layout
pub const APP_QUALIFIER: &str = "app";
pub const APP_ORGANIZATION: &str = "PlantScope";
pub const APP_NAME: &str = "plantscope";
pub const LOCAL_DB_FILENAME: &str = "local.db";
pub const DOCUMENT_DB_FILENAME: &str = "documents.db";
pub const BLOBS_FOLDER: &str = "blobs";

// Local key-value store
pub const DEFAULT_COLLECTION_KEY: &str = "plantCollection";
pub const CORRUPT_PAYLOAD_SUFFIX: &str = ".corrupt";
pub const CONFIG_SETTING_KEY: &str = "collection_config";

// SQLite
pub const DB_BUSY_TIMEOUT_MS: u32 = 5000;

// Network call bounds
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;

// Blob storage
pub const DEFAULT_BLOB_BASE_URL: &str = "https://storage.plantscope.app/plants";
pub const DEFAULT_MEDIA_EXTENSION: &str = "jpg";
pub const TEMP_FILE_PREFIX: &str = ".plantscope_tmp_";
pub const FILE_URI_SCHEME: &str = "file://";

// Hashing
pub const HASH_CHUNK_SIZE: usize = 1_048_576; // 1MB
