use crate::workflows::procurement::{
    EvidenceCurve, GoalThresholds, InferenceMode, OverBudgetPolicy, ProcurementConfig, Weights,
};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub procurement: ProcurementConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let feedback_dir = env::var("PROCURE_FEEDBACK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/feedback"));
        let catalog_path = env::var("PROCURE_CATALOG").ok().map(PathBuf::from);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            storage: StorageConfig {
                feedback_dir,
                catalog_path,
            },
            procurement: load_procurement()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the feedback log and learned-weight snapshot live, and which supplier catalog to
/// search. Without a catalog path the bundled sample catalog is used.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub feedback_dir: PathBuf,
    pub catalog_path: Option<PathBuf>,
}

fn load_procurement() -> Result<ProcurementConfig, ConfigError> {
    let defaults = ProcurementConfig::default();

    let default_weights = match env::var("PROCURE_WEIGHTS") {
        Ok(raw) => parse_weights(&raw)?,
        Err(_) => defaults.default_weights,
    };

    let goal_thresholds = GoalThresholds {
        theta_cost: number_var("PROCURE_THETA_COST", defaults.goal_thresholds.theta_cost)?,
        theta_evidence: number_var(
            "PROCURE_THETA_EVIDENCE",
            defaults.goal_thresholds.theta_evidence,
        )?,
        theta_quotation: number_var(
            "PROCURE_THETA_QUOTATION",
            defaults.goal_thresholds.theta_quotation,
        )?,
    };

    let inference_mode = match env::var("PROCURE_INFERENCE_MODE") {
        Ok(raw) => InferenceMode::parse(&raw).ok_or(ConfigError::InvalidValue {
            variable: "PROCURE_INFERENCE_MODE",
            value: raw,
        })?,
        Err(_) => defaults.inference_mode,
    };

    let over_budget = match env::var("PROCURE_OVER_BUDGET") {
        Ok(raw) => OverBudgetPolicy::parse(&raw).ok_or(ConfigError::InvalidValue {
            variable: "PROCURE_OVER_BUDGET",
            value: raw,
        })?,
        Err(_) => defaults.over_budget,
    };

    let evidence_curve = match env::var("PROCURE_EVIDENCE_CURVE") {
        Ok(raw) => EvidenceCurve::parse(&raw).ok_or(ConfigError::InvalidValue {
            variable: "PROCURE_EVIDENCE_CURVE",
            value: raw,
        })?,
        Err(_) => defaults.evidence_curve,
    };

    let preferred_vendors = env::var("PROCURE_PREFERRED_VENDORS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|vendor| !vendor.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or(defaults.preferred_vendors);

    Ok(ProcurementConfig {
        default_weights,
        goal_thresholds,
        inference_mode,
        top_k: number_var("PROCURE_TOP_K", defaults.top_k)?,
        max_results_per_query: number_var("PROCURE_MAX_RESULTS", defaults.max_results_per_query)?,
        preferred_vendors,
        vendor_bonus: number_var("PROCURE_VENDOR_BONUS", defaults.vendor_bonus)?,
        score_ceiling: defaults.score_ceiling,
        iteration_cap: number_var("PROCURE_ITERATION_CAP", defaults.iteration_cap)?,
        budget_tolerance: number_var("PROCURE_BUDGET_TOLERANCE", defaults.budget_tolerance)?,
        min_evidence: number_var("PROCURE_MIN_EVIDENCE", defaults.min_evidence)?,
        availability_margin_days: number_var(
            "PROCURE_AVAILABILITY_MARGIN_DAYS",
            defaults.availability_margin_days,
        )?,
        over_budget,
        evidence_curve,
        feedback_saturation: number_var(
            "PROCURE_FEEDBACK_SATURATION",
            defaults.feedback_saturation,
        )?,
        collaborator_timeout_ms: number_var(
            "PROCURE_COLLABORATOR_TIMEOUT_MS",
            defaults.collaborator_timeout_ms,
        )?,
        evidence_cache_ttl_hours: number_var(
            "PROCURE_EVIDENCE_CACHE_TTL_HOURS",
            defaults.evidence_cache_ttl_hours,
        )?,
        max_query_variants: defaults.max_query_variants,
    })
}

fn number_var<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue {
                variable,
                value: raw,
            }),
        Err(_) => Ok(default),
    }
}

fn parse_weights(raw: &str) -> Result<Weights, ConfigError> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::InvalidWeights {
            value: raw.to_string(),
        })?;

    match parts.as_slice() {
        [alpha, beta, gamma] if parts.iter().all(|w| w.is_finite() && *w >= 0.0) => {
            Ok(Weights::new(*alpha, *beta, *gamma).renormalized())
        }
        _ => Err(ConfigError::InvalidWeights {
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidWeights { value: String },
    InvalidValue { variable: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidWeights { value } => write!(
                f,
                "PROCURE_WEIGHTS must be three non-negative numbers 'alpha,beta,gamma' (got '{value}')"
            ),
            ConfigError::InvalidValue { variable, value } => {
                write!(f, "{variable} has an unsupported value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidWeights { .. }
            | ConfigError::InvalidValue { .. } => None,
        }
    }
}
