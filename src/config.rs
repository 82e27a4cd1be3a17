use crate::core::db::{ConnectParams, DEFAULT_CHARSET};
use crate::core::{DbError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable holding the server host.
pub const ENV_HOST: &str = "DBHOST";
/// Environment variable holding the user name.
pub const ENV_USER: &str = "DBUSER";
/// Environment variable holding the password.
pub const ENV_PASSWORD: &str = "DBPASSWD";
/// Environment variable holding the database name (the file path for SQLite).
pub const ENV_DATABASE: &str = "DATABASE";
/// Environment variable holding the server port.
pub const ENV_PORT: &str = "DBPORT";

/// Connection parameters that may be partially known.
///
/// Options are gathered from several sources and layered: environment
/// variables form the base, a config file section goes on top, and values
/// set explicitly through the builder methods win over both.
///
/// ```
/// use dbkit::ConnectOptions;
///
/// let file = ConnectOptions::new().database("from_file.db").username("svc");
/// let opts = file.layer(ConnectOptions::new().database("explicit.db"));
/// assert_eq!(opts.database.as_deref(), Some("explicit.db"));
/// assert_eq!(opts.username.as_deref(), Some("svc"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectOptions {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `DBHOST`, `DBUSER`, `DBPASSWD`, `DATABASE` and `DBPORT`.
    ///
    /// Unset variables stay `None`. An unparsable port is ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ConnectOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        ConnectOptions {
            server: lookup(ENV_HOST),
            port: lookup(ENV_PORT).and_then(|p| p.trim().parse().ok()),
            database: lookup(ENV_DATABASE),
            username: lookup(ENV_USER),
            password: lookup(ENV_PASSWORD),
            charset: None,
        }
    }

    /// Returns `self` with every field that `top` sets replaced by `top`'s value.
    pub fn layer(self, top: ConnectOptions) -> Self {
        ConnectOptions {
            server: top.server.or(self.server),
            port: top.port.or(self.port),
            database: top.database.or(self.database),
            username: top.username.or(self.username),
            password: top.password.or(self.password),
            charset: top.charset.or(self.charset),
        }
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Fills in defaults (charset `UTF-8`) and hands the result to a driver.
    pub fn into_params(self) -> ConnectParams {
        ConnectParams {
            server: self.server,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password,
            charset: self.charset.unwrap_or_else(|| DEFAULT_CHARSET.to_string()),
        }
    }
}

/// Tunables of a [`crate::Database`] client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Wait between two "more result sets?" polls in `call_procedure`.
    pub poll_interval: Duration,
    /// Parameter sets per driver call in non-fast `execute_many`.
    pub batch_size: usize,
    /// Default wait budget of `call_procedure`.
    pub procedure_timeout: Duration,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_PROCEDURE_TIMEOUT: Duration = Duration::from_secs(200);

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            procedure_timeout: DEFAULT_PROCEDURE_TIMEOUT,
        }
    }
}

/// One `[name]` table of a connections file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionSection {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub procedure_timeout_secs: Option<u64>,
}

impl ConnectionSection {
    pub fn options(&self) -> ConnectOptions {
        ConnectOptions {
            server: self.server.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            charset: self.charset.clone(),
        }
    }

    /// Client settings, with defaults for anything the section leaves out.
    pub fn settings(&self) -> Result<ClientSettings> {
        let defaults = ClientSettings::default();
        let batch_size = self.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(DbError::Config("batch_size must be at least 1".to_string()));
        }
        Ok(ClientSettings {
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size,
            procedure_timeout: self
                .procedure_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.procedure_timeout),
        })
    }
}

/// A parsed connections file: connection name to section.
#[derive(Debug, Clone, Default)]
pub struct ConnectionsFile {
    sections: HashMap<String, ConnectionSection>,
}

impl ConnectionsFile {
    pub fn parse(content: &str) -> Result<Self> {
        let sections: HashMap<String, ConnectionSection> = toml::from_str(content)?;
        Ok(ConnectionsFile { sections })
    }

    pub fn section(&self, name: &str) -> Result<&ConnectionSection> {
        self.sections
            .get(name)
            .ok_or_else(|| DbError::Config(format!("no [{}] section in connections file", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

/// Loads a connections file from the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML connections file.
///
/// # Example
///
/// ```no_run
/// let file = dbkit::config::load_connections("connections.toml").expect("Failed to load config");
/// let section = file.section("reporting").expect("missing section");
/// println!("{:?}", section.options());
/// ```
pub fn load_connections<P: AsRef<Path>>(path: P) -> Result<ConnectionsFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading connections file");
    let content = fs::read_to_string(path)?;
    ConnectionsFile::parse(&content)
}

/// `<config dir>/dbkit/connections.toml`, if the platform has a config dir.
pub fn default_connections_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbkit").join("connections.toml"))
}

/// Resolves one named connection: environment first, then the file section.
///
/// Explicit values are layered on afterwards by the caller with
/// [`ConnectOptions::layer`].
pub fn resolve_section<P: AsRef<Path>>(path: P, name: &str) -> Result<(ConnectOptions, ClientSettings)> {
    let file = load_connections(path)?;
    let section = file.section(name)?;
    let options = ConnectOptions::from_env().layer(section.options());
    Ok((options, section.settings()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[reporting]
server = "db.internal"
username = "svc"
password = "secret"
database = "reports.db"
port = 1433
charset = "UTF-8"
poll_interval_ms = 100
batch_size = 25

[scratch]
database = ":memory:"
"#;

    #[test]
    fn test_parse_sections() {
        let file = ConnectionsFile::parse(SAMPLE_CONFIG).expect("Failed to parse sample config");
        let reporting = file.section("reporting").unwrap();
        assert_eq!(reporting.server.as_deref(), Some("db.internal"));
        assert_eq!(reporting.port, Some(1433));

        let settings = reporting.settings().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.procedure_timeout, DEFAULT_PROCEDURE_TIMEOUT);

        let scratch = file.section("scratch").unwrap();
        assert_eq!(scratch.settings().unwrap(), ClientSettings::default());

        let mut names: Vec<&str> = file.names().collect();
        names.sort();
        assert_eq!(names, vec!["reporting", "scratch"]);
    }

    #[test]
    fn test_missing_section() {
        let file = ConnectionsFile::parse(SAMPLE_CONFIG).unwrap();
        match file.section("nope") {
            Err(DbError::Config(msg)) => assert!(msg.contains("[nope]")),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let file = ConnectionsFile::parse("[x]\nbatch_size = 0\n").unwrap();
        assert!(matches!(file.section("x").unwrap().settings(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_env_lookup() {
        let env: HashMap<&str, &str> = [
            ("DBHOST", "envhost"),
            ("DBUSER", "envuser"),
            ("DATABASE", "env.db"),
            ("DBPORT", "not-a-port"),
        ]
        .into_iter()
        .collect();
        let opts = ConnectOptions::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(opts.server.as_deref(), Some("envhost"));
        assert_eq!(opts.username.as_deref(), Some("envuser"));
        assert_eq!(opts.password, None);
        assert_eq!(opts.port, None);
    }

    #[test]
    fn test_explicit_values_win() {
        let env = ConnectOptions::new().server("envhost").database("env.db");
        let file = ConnectOptions::new().database("file.db").password("filepw");
        let explicit = ConnectOptions::new().password("explicitpw");

        let params = env.layer(file).layer(explicit).into_params();
        assert_eq!(params.server.as_deref(), Some("envhost"));
        assert_eq!(params.database.as_deref(), Some("file.db"));
        assert_eq!(params.password.as_deref(), Some("explicitpw"));
        assert_eq!(params.charset, "UTF-8");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.toml");
        fs::write(&path, SAMPLE_CONFIG).unwrap();

        let file = load_connections(&path).unwrap();
        assert_eq!(file.section("reporting").unwrap().database.as_deref(), Some("reports.db"));

        assert!(matches!(load_connections(dir.path().join("missing.toml")), Err(DbError::Io(_))));
    }

    #[test]
    fn test_default_path_shape() {
        if let Some(path) = default_connections_path() {
            assert!(path.ends_with("dbkit/connections.toml"));
        }
    }
}
