//! Configuration loading and typed config structures for the Microtrade economy.
//!
//! An economy is described by a YAML document whose sections mirror the
//! structs below. Every field has a default matching the reference
//! five-agent economy, so an empty document is a valid configuration.
//! [`EconomyConfig::validate`] runs after parsing and rejects values the
//! engine cannot honor.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use microtrade_types::{AgentId, ClearingRule};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an impossible economy.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level economy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EconomyConfig {
    /// Clearing, pricing, and order-lifetime settings.
    #[serde(default)]
    pub market: MarketConfig,

    /// Health tick settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Labor capacity and production boost settings.
    #[serde(default)]
    pub labor: LaborConfig,

    /// Starting endowment and production capacity per role.
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, RoleConfig>,

    /// Agents created at initialization, in seed order.
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentSeed>,

    /// Seed reference prices per good.
    #[serde(default = "default_goods")]
    pub goods: BTreeMap<String, Decimal>,

    /// Run boundaries and snapshot cadence.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            health: HealthConfig::default(),
            labor: LaborConfig::default(),
            roles: default_roles(),
            agents: default_agents(),
            goods: default_goods(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl EconomyConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.market.validate()?;
        self.health.validate()?;
        if self.labor.hours_per_extra_unit == 0 {
            return Err(invalid("labor.hours_per_extra_unit must be at least 1"));
        }

        for (good, price) in &self.goods {
            if *price <= Decimal::ZERO {
                return Err(invalid(format!("goods.{good} must have a positive price")));
            }
        }

        for (name, role) in &self.roles {
            if role.starting_currency.is_sign_negative() {
                return Err(invalid(format!(
                    "roles.{name}.starting_currency must not be negative"
                )));
            }
            for good in role.starting_goods.keys().chain(role.production.keys()) {
                if !self.goods.contains_key(good) {
                    return Err(invalid(format!(
                        "roles.{name} references unknown good {good}"
                    )));
                }
            }
        }

        let mut seen = BTreeSet::new();
        for seed in &self.agents {
            if seed.id.is_empty() {
                return Err(invalid("agent ids must not be empty"));
            }
            if !seen.insert(seed.id.as_str()) {
                return Err(invalid(format!("duplicate agent id {}", seed.id)));
            }
            if !self.roles.contains_key(&seed.role) {
                return Err(invalid(format!(
                    "agent {} has unknown role {}",
                    seed.id, seed.role
                )));
            }
            if seed
                .starting_currency
                .is_some_and(|c| c.is_sign_negative())
            {
                return Err(invalid(format!(
                    "agent {} has negative starting currency",
                    seed.id
                )));
            }
            if seed.health.is_some_and(|h| h > self.health.max_health) {
                return Err(invalid(format!(
                    "agent {} starts above max_health",
                    seed.id
                )));
            }
            if let Some(goods) = &seed.starting_goods
                && let Some(good) = goods.keys().find(|g| !self.goods.contains_key(*g))
            {
                return Err(invalid(format!(
                    "agent {} starts with unknown good {good}",
                    seed.id
                )));
            }
        }

        if let Some(facilitator) = &self.market.facilitator
            && !seen.contains(facilitator.as_str())
        {
            return Err(invalid(format!(
                "market.facilitator {facilitator} is not a configured agent"
            )));
        }

        Ok(())
    }

    /// Role settings by name.
    pub fn role(&self, name: &str) -> Option<&RoleConfig> {
        self.roles.get(name)
    }

    /// The agent that collects market fees.
    ///
    /// An explicit `market.facilitator` wins; otherwise the first seeded
    /// agent whose role equals `market.facilitator_role`. `None` disables
    /// fees.
    pub fn facilitator_id(&self) -> Option<AgentId> {
        if let Some(explicit) = &self.market.facilitator {
            return Some(AgentId::new(explicit.as_str()));
        }
        let role = self.market.facilitator_role.as_deref()?;
        self.agents
            .iter()
            .find(|seed| seed.role == role)
            .map(|seed| AgentId::new(seed.id.as_str()))
    }

    /// Per-cycle labor capacity for agents of `role`.
    pub fn labor_capacity_for(&self, role: &str) -> u32 {
        self.role(role)
            .and_then(|r| r.labor_capacity_hours)
            .unwrap_or(self.labor.hours_per_cycle)
    }

    /// Whether agents of `role` are skipped by the health tick.
    pub fn is_health_exempt(&self, role: &str) -> bool {
        self.health.exempt_roles.iter().any(|r| r == role)
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

/// Market clearing and pricing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarketConfig {
    /// Weight of the latest average clearing price in the reference price EMA.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: Decimal,

    /// Orders created at cycle `C` expire when cycle `C + order_expiry_cycles` opens.
    #[serde(default = "default_order_expiry_cycles")]
    pub order_expiry_cycles: u64,

    /// Fraction of each trade's gross taken as the facilitator fee.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Minimum price increment.
    #[serde(default = "default_price_increment")]
    pub price_increment: Decimal,

    /// How the execution price of a match is chosen.
    #[serde(default)]
    pub clearing_rule: ClearingRule,

    /// Explicit facilitator agent id.
    #[serde(default)]
    pub facilitator: Option<String>,

    /// Role whose first agent becomes the facilitator when none is named.
    #[serde(default = "default_facilitator_role")]
    pub facilitator_role: Option<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            ema_alpha: default_ema_alpha(),
            order_expiry_cycles: default_order_expiry_cycles(),
            fee_rate: default_fee_rate(),
            price_increment: default_price_increment(),
            clearing_rule: ClearingRule::default(),
            facilitator: None,
            facilitator_role: default_facilitator_role(),
        }
    }
}

impl MarketConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ema_alpha.is_sign_negative() || self.ema_alpha > Decimal::ONE {
            return Err(invalid("market.ema_alpha must be in [0, 1]"));
        }
        if self.fee_rate.is_sign_negative() || self.fee_rate >= Decimal::ONE {
            return Err(invalid("market.fee_rate must be in [0, 1)"));
        }
        if self.price_increment <= Decimal::ZERO {
            return Err(invalid("market.price_increment must be positive"));
        }
        if self.order_expiry_cycles == 0 {
            return Err(invalid("market.order_expiry_cycles must be at least 1"));
        }
        Ok(())
    }
}

/// Health tick configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthConfig {
    /// Upper bound of every agent's health.
    #[serde(default = "default_max_health")]
    pub max_health: u32,

    /// Health given to seeded agents without an override.
    #[serde(default = "default_max_health")]
    pub starting_health: u32,

    /// Health lost per cycle by agents that did not consume.
    #[serde(default = "default_decay_per_cycle")]
    pub decay_per_cycle: u32,

    /// Health gained per cycle by agents that consumed.
    #[serde(default = "default_consumption_gain")]
    pub consumption_gain: u32,

    /// When true, consuming replaces decay with the gain; when false the
    /// gain is applied on top of decay.
    #[serde(default = "default_true")]
    pub consumption_offsets_decay: bool,

    /// Roles the health tick skips entirely.
    #[serde(default = "default_exempt_roles")]
    pub exempt_roles: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_health: default_max_health(),
            starting_health: default_max_health(),
            decay_per_cycle: default_decay_per_cycle(),
            consumption_gain: default_consumption_gain(),
            consumption_offsets_decay: true,
            exempt_roles: default_exempt_roles(),
        }
    }
}

impl HealthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_health == 0 {
            return Err(invalid("health.max_health must be at least 1"));
        }
        if self.starting_health > self.max_health {
            return Err(invalid("health.starting_health exceeds health.max_health"));
        }
        Ok(())
    }
}

/// Labor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LaborConfig {
    /// Default hours each agent may commit per cycle.
    #[serde(default = "default_hours_per_cycle")]
    pub hours_per_cycle: u32,

    /// Hired hours needed for one extra unit of production.
    #[serde(default = "default_hours_per_extra_unit")]
    pub hours_per_extra_unit: u32,
}

impl Default for LaborConfig {
    fn default() -> Self {
        Self {
            hours_per_cycle: default_hours_per_cycle(),
            hours_per_extra_unit: default_hours_per_extra_unit(),
        }
    }
}

/// Endowment and production capacity shared by every agent of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleConfig {
    /// Currency each agent of this role starts with.
    #[serde(default)]
    pub starting_currency: Decimal,

    /// Goods each agent of this role starts with.
    #[serde(default)]
    pub starting_goods: BTreeMap<String, u32>,

    /// Units per good an agent of this role may produce each cycle before
    /// any labor boost.
    #[serde(default)]
    pub production: BTreeMap<String, u32>,

    /// Per-cycle labor capacity, overriding `labor.hours_per_cycle`.
    #[serde(default)]
    pub labor_capacity_hours: Option<u32>,
}

/// One agent created at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentSeed {
    /// Stable agent id.
    pub id: String,

    /// Role name; must exist in `roles`.
    pub role: String,

    /// Overrides the role's starting currency.
    #[serde(default)]
    pub starting_currency: Option<Decimal>,

    /// Overrides the role's starting goods.
    #[serde(default)]
    pub starting_goods: Option<BTreeMap<String, u32>>,

    /// Overrides `health.starting_health`.
    #[serde(default)]
    pub health: Option<u32>,
}

impl AgentSeed {
    /// A seed using its role's defaults.
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            starting_currency: None,
            starting_goods: None,
            health: None,
        }
    }
}

/// Run boundaries for [`run_simulation`](crate::runner::run_simulation).
///
/// A `max_cycles` of 0 means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Stop once this cycle has been committed (0 = unlimited).
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,

    /// Real-time milliseconds to wait between cycles.
    #[serde(default)]
    pub cycle_interval_ms: u64,

    /// Write a snapshot every this many cycles (0 = never).
    #[serde(default = "default_snapshot_interval_cycles")]
    pub snapshot_interval_cycles: u64,

    /// Directory snapshots are written to.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// Stop when no agent subject to the health tick remains active.
    #[serde(default = "default_true")]
    pub stop_on_extinction: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            cycle_interval_ms: 0,
            snapshot_interval_cycles: default_snapshot_interval_cycles(),
            snapshot_dir: default_snapshot_dir(),
            stop_on_extinction: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_ema_alpha() -> Decimal {
    Decimal::new(3, 1)
}

const fn default_order_expiry_cycles() -> u64 {
    3
}

fn default_fee_rate() -> Decimal {
    Decimal::new(5, 2)
}

fn default_price_increment() -> Decimal {
    Decimal::new(1, 2)
}

fn default_facilitator_role() -> Option<String> {
    Some(String::from("market"))
}

const fn default_max_health() -> u32 {
    100
}

const fn default_decay_per_cycle() -> u32 {
    15
}

const fn default_consumption_gain() -> u32 {
    5
}

fn default_exempt_roles() -> Vec<String> {
    vec![String::from("market")]
}

const fn default_hours_per_cycle() -> u32 {
    5
}

const fn default_hours_per_extra_unit() -> u32 {
    2
}

const fn default_max_cycles() -> u64 {
    10
}

const fn default_snapshot_interval_cycles() -> u64 {
    1
}

fn default_snapshot_dir() -> String {
    String::from("snapshots")
}

const fn default_true() -> bool {
    true
}

fn default_goods() -> BTreeMap<String, Decimal> {
    let mut goods = BTreeMap::new();
    goods.insert(String::from("food"), Decimal::new(20, 1));
    goods
}

fn role_defaults(currency: i64, food: u32, production: u32) -> RoleConfig {
    let mut starting_goods = BTreeMap::new();
    if food > 0 {
        starting_goods.insert(String::from("food"), food);
    }
    let mut output = BTreeMap::new();
    if production > 0 {
        output.insert(String::from("food"), production);
    }
    RoleConfig {
        starting_currency: Decimal::new(currency, 0),
        starting_goods,
        production: output,
        labor_capacity_hours: None,
    }
}

fn default_roles() -> BTreeMap<String, RoleConfig> {
    let mut roles = BTreeMap::new();
    roles.insert(String::from("producer"), role_defaults(10, 5, 1));
    roles.insert(String::from("consumer"), role_defaults(8, 2, 0));
    roles.insert(String::from("market"), role_defaults(6, 0, 0));
    roles.insert(String::from("worker"), role_defaults(8, 2, 0));
    roles.insert(String::from("trader"), role_defaults(8, 2, 0));
    roles
}

fn default_agents() -> Vec<AgentSeed> {
    ["producer", "consumer", "market", "worker", "trader"]
        .into_iter()
        .map(|name| AgentSeed::new(name, name))
        .collect()
}
