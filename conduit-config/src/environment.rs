use std::fmt;
use std::io::Error;

/// Environment variable name containing the environment identifier.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Production environment identifier.
const PROD_ENV_NAME: &str = "prod";

/// Development environment identifier.
const DEV_ENV_NAME: &str = "dev";

/// Runtime environment for the application.
///
/// Selects which configuration overlay is loaded and how telemetry is emitted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Environment {
    /// Production environment.
    Prod,
    /// Development environment.
    Dev,
}

impl Environment {
    /// Loads the environment from the `APP_ENVIRONMENT` environment variable.
    ///
    /// Defaults to [`Environment::Dev`] if the variable is not set, since the toolkit is
    /// mostly driven from a terminal.
    pub fn load() -> Result<Environment, Error> {
        std::env::var(APP_ENVIRONMENT_ENV_NAME)
            .unwrap_or_else(|_| DEV_ENV_NAME.into())
            .try_into()
    }

    /// Sets the `APP_ENVIRONMENT` environment variable to this environment's value.
    pub fn set(&self) {
        // SAFETY: only called during process or test bootstrap before worker threads exist.
        unsafe { std::env::set_var(APP_ENVIRONMENT_ENV_NAME, self.as_str()) }
    }

    /// Returns whether this is the production environment.
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Returns the string name of the environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Attempts to create an [`Environment`] from a string, case-insensitively.
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use either `{DEV_ENV_NAME}` or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}
