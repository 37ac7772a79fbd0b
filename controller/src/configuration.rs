use std::path::Path;

#[derive(serde::Deserialize, Debug)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
}

/// Addresses of host daemons to bootstrap at startup, e.g. "127.0.0.1:50052".
/// The controller has no service discovery of its own: every host it can
/// place VMs on must be listed here.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct HostsSettings {
    pub addresses: Vec<String>,
}

#[derive(serde::Deserialize, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub hosts: HostsSettings,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/.."));
    let configuration_directory = base_path.join("configuration");
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());
    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(configuration_directory.join(environment_filename)))
        .set_override_option("application.host", std::env::var("APP_HOST").ok())?
        .set_override_option("application.port", std::env::var("APP_PORT").ok())?
        .set_override_option(
            "hosts.addresses",
            std::env::var("CONTROLLER_HOST_ADDRESSES")
                .ok()
                .map(|v| v.split(',').map(str::to_string).collect::<Vec<_>>()),
        )?
        .build()?;
    settings.try_deserialize::<Settings>()
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}
