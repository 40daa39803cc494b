use std::env;
use std::time::Duration;

/// Smallest part size S3 accepts for every part except the last one.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Relay configuration, built once at startup and handed to the pipeline
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Destination bucket for every transfer
    pub bucket_name: String,

    /// Multipart part size in bytes (default: 64 MB)
    pub part_size: usize,

    /// Parts uploaded in parallel (default: 4)
    pub upload_concurrency: usize,

    /// Number of chunks the pass-through buffer holds before the fetch is paused (default: 16)
    pub relay_capacity: usize,

    /// Optional deadline for a whole transfer; none keeps a hung transfer open
    pub transfer_timeout: Option<Duration>,

    /// Path or name of the yt-dlp executable (default: "yt-dlp")
    pub ytdlp_binary: String,

    /// Scheme used when building the object locator (default: "s3")
    pub storage_scheme: String,

    /// Custom S3 endpoint, e.g. MinIO
    pub s3_endpoint: Option<String>,

    /// S3 region (default: "us-east-1")
    pub s3_region: String,

    /// Use path-style bucket addressing (needed by most S3-compatible stores)
    pub s3_force_path_style: bool,

    /// Static access key; the AWS default credential chain is used when unset
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            part_size: 64 * 1024 * 1024, // 64 MB
            upload_concurrency: 4,
            relay_capacity: 16,
            transfer_timeout: None,
            ytdlp_binary: "yt-dlp".to_string(),
            storage_scheme: "s3".to_string(),
            s3_endpoint: None,
            s3_region: "us-east-1".to_string(),
            s3_force_path_style: false,
            s3_access_key: None,
            s3_secret_key: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let default = Self::default();

        let bucket_name = env::var("BUCKET_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("BUCKET_NAME must be set"))?;

        let config = Self {
            bucket_name,

            part_size: env::var("PART_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.part_size),

            upload_concurrency: env::var("UPLOAD_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.upload_concurrency),

            relay_capacity: env::var("RELAY_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.relay_capacity),

            transfer_timeout: env::var("TRANSFER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),

            ytdlp_binary: env::var("YTDLP_BINARY").unwrap_or(default.ytdlp_binary),

            storage_scheme: env::var("STORAGE_SCHEME").unwrap_or(default.storage_scheme),

            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),

            s3_region: env::var("AWS_REGION").unwrap_or(default.s3_region),

            s3_force_path_style: env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.s3_force_path_style),

            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
        };

        Ok(config.normalized())
    }

    /// Create config for local development against MinIO
    pub fn development(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            part_size: MIN_PART_SIZE,
            upload_concurrency: 2,
            relay_capacity: 8,
            transfer_timeout: Some(Duration::from_secs(15 * 60)),
            ytdlp_binary: "yt-dlp".to_string(),
            storage_scheme: "s3".to_string(),
            s3_endpoint: Some("http://127.0.0.1:9000".to_string()),
            s3_region: "us-east-1".to_string(),
            s3_force_path_style: true,
            s3_access_key: Some("minioadmin".to_string()),
            s3_secret_key: Some("minioadmin".to_string()),
        }
    }

    /// Clamp values the storage protocol or the relay cannot work with
    pub fn normalized(mut self) -> Self {
        self.part_size = self.part_size.max(MIN_PART_SIZE);
        self.upload_concurrency = self.upload_concurrency.max(1);
        self.relay_capacity = self.relay_capacity.max(1);
        self
    }
}
