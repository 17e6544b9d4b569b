use config::ConfigError;

/// Placeholder secrets shipped in `configuration/base.yaml`.
pub const DEFAULT_ACCESS_SECRET: &str = "change-me-access-token-secret";
pub const DEFAULT_REFRESH_SECRET: &str = "change-me-refresh-token-secret";
const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password: PasswordSettings,
    #[serde(default)]
    pub reaper: ReaperSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing settings
///
/// Access and refresh tokens are signed with different secrets.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_seconds: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_seconds: i64,
    pub issuer: String,
}

// Secrets stay out of debug output.
impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("issuer", &self.issuer)
            .finish()
    }
}

fn default_access_ttl() -> i64 {
    15 * 60
}

fn default_refresh_ttl() -> i64 {
    30 * 24 * 60 * 60
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    /// bcrypt work factor
    pub hash_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self { hash_cost: 10 }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ReaperSettings {
    pub interval_seconds: u64,
    /// How long revoked rows are kept for replay detection
    pub revoked_retention_seconds: i64,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 24 * 60 * 60,
            revoked_retention_seconds: 7 * 24 * 60 * 60,
        }
    }
}

impl Settings {
    /// Names every secret that must not reach a production deployment:
    /// placeholder or short secrets and a secret shared by both codecs.
    pub fn insecure_defaults(&self) -> Vec<&'static str> {
        let mut findings = Vec::new();
        let jwt = &self.jwt;

        if jwt.access_secret == DEFAULT_ACCESS_SECRET {
            findings.push("jwt.access_secret is the shipped placeholder");
        } else if jwt.access_secret.len() < MIN_SECRET_LENGTH {
            findings.push("jwt.access_secret is shorter than 32 bytes");
        }

        if jwt.refresh_secret == DEFAULT_REFRESH_SECRET {
            findings.push("jwt.refresh_secret is the shipped placeholder");
        } else if jwt.refresh_secret.len() < MIN_SECRET_LENGTH {
            findings.push("jwt.refresh_secret is shorter than 32 bytes");
        }

        if jwt.access_secret == jwt.refresh_secret {
            findings.push("jwt.access_secret and jwt.refresh_secret are identical");
        }

        findings
    }
}

/// Reads `configuration/base.yaml` (if present) and then `APP__SECTION__KEY`
/// environment variables, which take precedence.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration/base").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
