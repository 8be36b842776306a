//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check topology integrity (unique ids, usable addresses, quorum possible)
//! - Validate value ranges (thresholds, intervals and timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{RestartKind, RoutingKind, WatchConfig};
use crate::registry::Tier;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &WatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_members(config, &mut errors);
    validate_tiers(config, &mut errors);

    if config.routing.kind == RoutingKind::Http {
        match config.routing.base_url.as_deref() {
            None => errors.push(ValidationError::new(
                "routing.base_url",
                "required when routing.kind = \"http\"",
            )),
            Some(raw) => check_url("routing.base_url", raw, &mut errors),
        }
    }
    if config.routing.timeout_ms == 0 {
        errors.push(ValidationError::new("routing.timeout_ms", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
    if retries.reconcile_interval_secs == 0 {
        errors.push(ValidationError::new(
            "retries.reconcile_interval_secs",
            "must be greater than 0",
        ));
    }

    let recovery = &config.recovery;
    match recovery.restart {
        RestartKind::Disabled => {}
        RestartKind::Command => {
            if recovery.program.as_deref().map_or(true, |p| p.trim().is_empty()) {
                errors.push(ValidationError::new(
                    "recovery.program",
                    "required when recovery.restart = \"command\"",
                ));
            }
        }
        RestartKind::Webhook => match recovery.webhook_url.as_deref() {
            None => errors.push(ValidationError::new(
                "recovery.webhook_url",
                "required when recovery.restart = \"webhook\"",
            )),
            Some(raw) => check_url("recovery.webhook_url", raw, &mut errors),
        },
    }

    if let Some(raw) = config.replica_set.status_url.as_deref() {
        check_url("replica_set.status_url", raw, &mut errors);
        if config.replica_set.interval_ms == 0 {
            errors.push(ValidationError::new("replica_set.interval_ms", "must be greater than 0"));
        }
    }

    if config.observability.audit_capacity == 0 {
        errors.push(ValidationError::new(
            "observability.audit_capacity",
            "must be greater than 0",
        ));
    }
    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_members(config: &WatchConfig, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();

    for (i, member) in config.members.iter().enumerate() {
        let field = format!("members[{}]", i);
        let id = member.id.trim();
        if id.is_empty() {
            errors.push(ValidationError::new(format!("{}.id", field), "must not be empty"));
        } else if !seen.insert(id.to_string()) {
            errors.push(ValidationError::new(
                format!("{}.id", field),
                format!("duplicate member id '{}'", id),
            ));
        }
        if member.address.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.address", field), "must not be empty"));
        }
        if member.tier != Tier::Db && member.voting.is_some() {
            errors.push(ValidationError::new(
                format!("{}.voting", field),
                "only db members vote",
            ));
        }
    }

    let db_members: Vec<_> = config.members.iter().filter(|m| m.tier == Tier::Db).collect();
    if !db_members.is_empty() && !db_members.iter().any(|m| m.voting.unwrap_or(true)) {
        errors.push(ValidationError::new(
            "members",
            "db tier has no voting member, quorum can never hold",
        ));
    }
}

fn validate_tiers(config: &WatchConfig, errors: &mut Vec<ValidationError>) {
    for tier in Tier::ALL {
        let raw = config.tiers.get(tier);
        let field = format!("tiers.{}", tier);
        let checks = [
            ("interval_ms", raw.interval_ms.map(|v| v == 0)),
            ("timeout_ms", raw.timeout_ms.map(|v| v == 0)),
            ("unhealthy_threshold", raw.unhealthy_threshold.map(|v| v == 0)),
            ("healthy_threshold", raw.healthy_threshold.map(|v| v == 0)),
            ("default_port", raw.default_port.map(|v| v == 0)),
        ];
        for (name, is_zero) in checks {
            if is_zero == Some(true) {
                errors.push(ValidationError::new(
                    format!("{}.{}", field, name),
                    "must be greater than 0",
                ));
            }
        }
    }
}

fn check_url(field: &str, raw: &str, errors: &mut Vec<ValidationError>) {
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}
