use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "AMORA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "AMORA_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management server (health checks)
    #[arg(long, env = "AMORA_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks during shutdown
    #[arg(long, env = "AMORA_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Maximum time a single request may run before it is aborted
    #[arg(long, env = "AMORA_REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret used to verify session tokens issued by the identity provider
    #[arg(long, env = "AMORA_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StorageAuth {
    /// Exchange a signed service-account assertion for a bearer token
    #[default]
    JwtExchange,
    /// Let the SDK resolve credentials from the environment
    AmbientCredential,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum UrlMode {
    /// Deterministic URL for publicly readable objects
    #[default]
    Public,
    /// Time-limited signed URL for private objects
    Signed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyScheme {
    /// Base36 millisecond timestamp plus a random suffix
    #[default]
    TimestampRandom,
    /// Random UUID v4
    Uuid,
}

#[derive(Clone, Debug, Args)]
pub struct StorageConfig {
    /// How the gateway authorizes against the bucket
    #[arg(long = "storage-auth", env = "AMORA_STORAGE_AUTH", value_enum, default_value_t = StorageAuth::JwtExchange)]
    pub auth: StorageAuth,

    /// Bucket name. Defaults to `<project-id>.appspot.com` when unset.
    #[arg(long = "storage-bucket", env = "AMORA_STORAGE_BUCKET")]
    pub bucket: Option<String>,

    /// Cloud project id
    #[arg(long, env = "AMORA_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Service-account email used as the assertion issuer
    #[arg(long, env = "AMORA_CLIENT_EMAIL")]
    pub client_email: Option<String>,

    /// Service-account private key (PEM, literal `\n` sequences allowed)
    #[arg(long, env = "AMORA_PRIVATE_KEY", hide_env_values = true, allow_hyphen_values = true)]
    pub private_key: Option<String>,

    /// OAuth token endpoint for the JWT-bearer grant
    #[arg(long, env = "AMORA_TOKEN_URI", default_value = "https://oauth2.googleapis.com/token")]
    pub token_uri: String,

    /// OAuth scope requested for storage access
    #[arg(
        long,
        env = "AMORA_STORAGE_SCOPE",
        default_value = "https://www.googleapis.com/auth/devstorage.read_write"
    )]
    pub scope: String,

    /// Fixed bearer token, bypassing the exchange (emulators only)
    #[arg(long, env = "AMORA_STORAGE_STATIC_TOKEN", hide_env_values = true)]
    pub static_token: Option<String>,

    /// Base URL of the storage JSON API
    #[arg(long, env = "AMORA_STORAGE_API_URL", default_value = "https://storage.googleapis.com")]
    pub api_base_url: String,

    /// Base URL used for public object links. Derived from the backend when unset.
    #[arg(long, env = "AMORA_STORAGE_PUBLIC_URL")]
    pub public_base_url: Option<String>,

    /// Whether uploads resolve to public or signed URLs
    #[arg(long, env = "AMORA_STORAGE_URL_MODE", value_enum, default_value_t = UrlMode::Public)]
    pub url_mode: UrlMode,

    /// Lifetime of signed URLs in seconds (capped at 7 days)
    #[arg(long, env = "AMORA_SIGNED_URL_EXPIRY_SECS", default_value_t = 604_800)]
    pub signed_url_expiry_secs: u64,

    /// Prefix prepended to every object key
    #[arg(long, env = "AMORA_STORAGE_KEY_PREFIX", default_value = "photos/")]
    pub key_prefix: String,

    /// Object key generation scheme
    #[arg(long, env = "AMORA_STORAGE_KEY_SCHEME", value_enum, default_value_t = KeyScheme::TimestampRandom)]
    pub key_scheme: KeyScheme,

    /// Max upload size in bytes (Default: 20MB)
    #[arg(long, env = "AMORA_MAX_UPLOAD_BYTES", default_value_t = 20_971_520)]
    pub max_upload_bytes: usize,

    /// S3 region (ambient-credential backend)
    #[arg(long = "s3-region", env = "AMORA_S3_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint (useful for MinIO)
    #[arg(long = "s3-endpoint", env = "AMORA_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// S3 access key, overrides the ambient credential chain
    #[arg(long = "s3-access-key", env = "AMORA_S3_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// S3 secret key, overrides the ambient credential chain
    #[arg(long = "s3-secret-key", env = "AMORA_S3_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Force path style (required for many MinIO setups: http://host/bucket/key)
    #[arg(long = "s3-force-path-style", env = "AMORA_S3_FORCE_PATH_STYLE", default_value_t = false)]
    pub force_path_style: bool,
}

impl StorageConfig {
    /// Resolves the bucket, falling back to the project's default bucket.
    #[must_use]
    pub fn bucket_name(&self) -> Option<String> {
        self.bucket
            .clone()
            .filter(|b| !b.is_empty())
            .or_else(|| self.project_id.as_ref().map(|p| format!("{p}.appspot.com")))
    }

    /// Returns the private key with escaped newlines restored.
    #[must_use]
    pub fn private_key_pem(&self) -> Option<String> {
        self.private_key.as_ref().map(|k| k.replace("\\n", "\n"))
    }
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Postgres URL for the message collection. In-memory when unset.
    #[arg(long, env = "AMORA_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Redis URL for cross-node change notifications. In-process when unset.
    #[arg(long, env = "AMORA_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Maximum number of characters in a message
    #[arg(long, env = "AMORA_MAX_MESSAGE_CHARS", default_value_t = 4000)]
    pub max_message_chars: usize,

    /// Capacity of each per-user change channel
    #[arg(long, env = "AMORA_CHANNEL_CAPACITY", default_value_t = 16)]
    pub channel_capacity: usize,

    /// How often idle change channels are reclaimed
    #[arg(long, env = "AMORA_GC_INTERVAL_SECS", default_value_t = 60)]
    pub gc_interval_secs: u64,

    /// Minimum backoff when reconnecting to Redis
    #[arg(long, env = "AMORA_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub pubsub_min_backoff_secs: u64,

    /// Maximum backoff when reconnecting to Redis
    #[arg(long, env = "AMORA_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub pubsub_max_backoff_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness check
    #[arg(long, env = "AMORA_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    /// Timeout for the storage readiness check
    #[arg(long, env = "AMORA_HEALTH_STORAGE_TIMEOUT_MS", default_value_t = 2000)]
    pub storage_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "AMORA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces, metrics and logs are exported when set
    #[arg(long, env = "AMORA_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
