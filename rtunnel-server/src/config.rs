use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rtunnel_core::config::{duration_from_secs, parse_value, Config, ConfigError, ConfigLoader};
use rtunnel_core::control::ControlOptions;

use crate::AppArguments;

pub mod env {
    pub const LISTEN_IP: &str = "RTUNNEL_LISTEN_IP";
    pub const CONTROL_PORT: &str = "RTUNNEL_CONTROL_PORT";
    pub const EXPOSED_PORT: &str = "RTUNNEL_EXPOSED_PORT";
    pub const SECRET: &str = "RTUNNEL_SECRET";
    pub const GRACE_PERIOD: &str = "RTUNNEL_GRACE_PERIOD";
    pub const CONFIG_FILE: &str = "RTUNNEL_CONFIG_FILE";
}

const DEFAULT_CONFIG_FILE: &str = "./rtunnel-server.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    listen_ip: IpAddr,
    control_port: u16,
    exposed_port: u16,
    secret: Option<String>,
    grace_period_secs: f64,
    auth_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_port: 4777,
            exposed_port: 5666,
            secret: None,
            grace_period_secs: 30.0,
            auth_timeout_secs: 10,
        }
    }
}

// FILE
// Environment Variables
// App Arguments

impl ServerConfig {
    pub fn new(
        listen_ip: IpAddr,
        control_port: u16,
        exposed_port: u16,
        secret: Option<&str>,
        grace_period: Duration,
    ) -> Self {
        Self {
            listen_ip,
            control_port,
            exposed_port,
            secret: secret.map(str::to_owned),
            grace_period_secs: grace_period.as_secs_f64(),
            ..Default::default()
        }
    }

    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.control_port)
    }

    pub fn exposed_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.exposed_port)
    }

    pub fn listen_ip(&self) -> IpAddr {
        self.listen_ip
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn exposed_port(&self) -> u16 {
        self.exposed_port
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// `Duration::MAX` for values `validate` rejects.
    pub fn grace_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.grace_period_secs).unwrap_or(Duration::MAX)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn control_options(&self) -> ControlOptions {
        ControlOptions {
            secret: self.secret.clone(),
            auth_timeout: self.auth_timeout(),
            ..Default::default()
        }
    }

    fn set_secret(&mut self, secret: &str) {
        self.secret = match secret.is_empty() {
            true => None,
            false => Some(secret.to_owned()),
        };
    }
}

impl Config<AppArguments> for ServerConfig {
    fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        for (name, value) in env {
            match name.as_str() {
                env::LISTEN_IP => self.listen_ip = parse_value(name, value)?,
                env::CONTROL_PORT => self.control_port = parse_value(name, value)?,
                env::EXPOSED_PORT => self.exposed_port = parse_value(name, value)?,
                env::GRACE_PERIOD => self.grace_period_secs = parse_value(name, value)?,
                env::SECRET => self.set_secret(value),
                _ => continue,
            }
        }

        Ok(())
    }

    fn apply_args(&mut self, args: &AppArguments) -> Result<(), ConfigError> {
        if let Some(ip) = args.ip() {
            self.listen_ip = ip;
        }

        if let Some(port) = args.control_port() {
            self.control_port = port;
        }

        if let Some(port) = args.exposed_port() {
            self.exposed_port = port;
        }

        if let Some(secret) = args.secret() {
            self.set_secret(secret);
        }

        if let Some(grace_period) = args.grace_period() {
            self.grace_period_secs = grace_period;
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.control_port == 0 || self.exposed_port == 0 {
            return Err(ConfigError::Invalid("ports cannot be zero".to_owned()));
        }

        if self.control_port == self.exposed_port {
            return Err(ConfigError::Invalid(
                "control port and exposed port must differ".to_owned(),
            ));
        }

        if duration_from_secs("grace_period_secs", self.grace_period_secs)?.is_zero() {
            return Err(ConfigError::Invalid("grace period must be positive".to_owned()));
        }

        if self.auth_timeout_secs == 0 {
            return Err(ConfigError::Invalid("auth timeout must be positive".to_owned()));
        }

        Ok(())
    }
}

impl ConfigLoader<AppArguments> for ServerConfig {
    fn named_environment_variables() -> HashSet<&'static str> {
        HashSet::from([
            env::LISTEN_IP,
            env::CONTROL_PORT,
            env::EXPOSED_PORT,
            env::SECRET,
            env::GRACE_PERIOD,
            env::CONFIG_FILE,
        ])
    }

    /// `--config` wins over RTUNNEL_CONFIG_FILE. without either, the config
    /// file lives next to where the executable is running.
    fn config_path(env: &HashMap<String, String>, args: &AppArguments) -> PathBuf {
        if let Some(path) = args.config() {
            return path.to_owned();
        }

        env.get(env::CONFIG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::path::PathBuf;
    use std::str::FromStr;
    use std::time::Duration;

    use rtunnel_core::config::{ConfigError, ConfigLoader};
    use rtunnel_core::is_type;
    use uuid::Uuid;

    use crate::{env, AppArguments, ServerConfig};

    #[test]
    pub fn should_read_from_file() {
        // Arrange
        let file_name = temp_file_name();
        let args = AppArguments::default();
        let config = create_default_file(&file_name);

        let env_vars = vec![(env::CONFIG_FILE.to_owned(), file_name.to_owned())];

        // Act
        let parsed_config = ServerConfig::load(&env_vars, &args).unwrap();

        // Assert
        assert_eq!(parsed_config, config);

        remove_file(&file_name);
    }

    #[test]
    pub fn environment_variables_should_override_file() {
        // Arrange
        let file_name = temp_file_name();
        let args = AppArguments::default();
        let config = create_default_file(&file_name);

        let env_vars = vec![
            (env::CONFIG_FILE.to_owned(), file_name.to_owned()),
            (env::EXPOSED_PORT.to_owned(), "3337".to_owned()),
            (env::SECRET.to_owned(), "from-env".to_owned()),
        ];

        // Act
        let parsed_config = ServerConfig::load(&env_vars, &args).unwrap();

        // Assert
        assert_ne!(parsed_config.exposed_port(), config.exposed_port());
        assert_eq!(parsed_config.exposed_port(), 3337);
        assert_eq!(parsed_config.secret(), Some("from-env"));

        remove_file(&file_name);
    }

    #[test]
    pub fn arguments_should_override_env_and_file() {
        // Arrange
        let file_name = temp_file_name();
        let expected_ip = IpAddr::from_str("129.1.1.2").unwrap();
        let args = AppArguments::new(
            Some(PathBuf::from(&file_name)),
            Some(expected_ip),
            Some(7000),
            Some(7001),
            Some("from-args".to_owned()),
            Some(2.5),
        );

        let env_vars = vec![
            (env::LISTEN_IP.to_owned(), "130.2.2.3".to_owned()),
            (env::CONTROL_PORT.to_owned(), "120".to_owned()),
            (env::SECRET.to_owned(), "from-env".to_owned()),
            (env::GRACE_PERIOD.to_owned(), "40".to_owned()),
        ];

        // Act
        let parsed_config = ServerConfig::load(&env_vars, &args).unwrap();

        // Assert
        assert_eq!(parsed_config.listen_ip(), expected_ip);
        assert_eq!(parsed_config.control_port(), 7000);
        assert_eq!(parsed_config.exposed_port(), 7001);
        assert_eq!(parsed_config.secret(), Some("from-args"));
        assert_eq!(parsed_config.grace_period(), Duration::from_millis(2500));

        remove_file(&file_name);
    }

    #[test]
    pub fn should_create_file_if_doesnt_exist() {
        // Arrange
        let file_name = temp_file_name();
        let args = AppArguments::default();
        let env_vars = vec![(env::CONFIG_FILE.to_owned(), file_name.to_owned())];

        // Act
        let created_config = ServerConfig::load(&env_vars, &args).unwrap();

        // Assert
        assert!(std::fs::metadata(&file_name).is_ok());
        assert_eq!(created_config, ServerConfig::default());
        assert_eq!(created_config.grace_period(), Duration::from_secs(30));

        remove_file(&file_name);
    }

    #[test]
    pub fn should_reject_same_control_and_exposed_port() {
        // Arrange
        let file_name = temp_file_name();
        let args = AppArguments::new(None, None, Some(5000), Some(5000), None, None);
        let env_vars = vec![(env::CONFIG_FILE.to_owned(), file_name.to_owned())];

        // Act
        let result = ServerConfig::load(&env_vars, &args);

        // Assert
        assert!(is_type!(result.unwrap_err(), ConfigError::Invalid(_)));

        remove_file(&file_name);
    }

    #[test]
    pub fn should_reject_non_positive_grace_period() {
        // Arrange
        let file_name = temp_file_name();
        let env_vars = vec![
            (env::CONFIG_FILE.to_owned(), file_name.to_owned()),
            (env::GRACE_PERIOD.to_owned(), "0".to_owned()),
        ];

        // Act
        let result = ServerConfig::load(&env_vars, &AppArguments::default());

        // Assert
        assert!(is_type!(result.unwrap_err(), ConfigError::Invalid(_)));

        remove_file(&file_name);
    }

    #[test]
    pub fn should_reject_grace_period_out_of_range() {
        // Arrange
        let file_name = temp_file_name();
        let env_vars = vec![
            (env::CONFIG_FILE.to_owned(), file_name.to_owned()),
            (env::GRACE_PERIOD.to_owned(), "1e20".to_owned()),
        ];

        // Act
        let result = ServerConfig::load(&env_vars, &AppArguments::default());

        // Assert
        assert!(is_type!(result.unwrap_err(), ConfigError::InvalidValue { .. }));

        remove_file(&file_name);
    }

    #[test]
    pub fn empty_secret_should_disable_authentication() {
        // Arrange
        let file_name = temp_file_name();
        let env_vars = vec![
            (env::CONFIG_FILE.to_owned(), file_name.to_owned()),
            (env::SECRET.to_owned(), "".to_owned()),
        ];

        // Act
        let parsed_config = ServerConfig::load(&env_vars, &AppArguments::default()).unwrap();

        // Assert
        assert_eq!(parsed_config.secret(), None);
        assert_eq!(parsed_config.control_options().secret, None);

        remove_file(&file_name);
    }

    fn temp_file_name() -> String {
        let path = std::env::temp_dir().join(format!("{}.json", Uuid::new_v4()));
        path.to_string_lossy().into_owned()
    }

    /// Util function for removing the file after each test.
    fn remove_file(file_name: &str) {
        let _ = std::fs::remove_file(file_name);
    }

    /// Creates default file and writes it to disk.
    fn create_default_file(file_name: &str) -> ServerConfig {
        let config = ServerConfig::new(
            IpAddr::from_str("127.0.0.1").unwrap(),
            8080,
            8081,
            Some("secret"),
            Duration::from_secs(5),
        );

        let config_str = serde_json::to_string(&config).unwrap();
        std::fs::write(file_name, config_str).unwrap();

        config
    }
}
