//! Allocation validator.
//!
//! Checks a raw allocation list before any tree is built. Validation is pure:
//! the input is never modified, and the same input always yields the same
//! report. Every problem is collected, so a caller sees the full list at once.
//!
//! The only way to obtain [`ValidatedAllocations`] is [`AllocationValidator::validated`],
//! which makes "validated before creation" a compile-time requirement of
//! [`crate::manager::DistributionManager::create_distribution`].

use crate::config::ValidationConfig;
use crate::error::DistributorError;
use crate::ethereum::Address;
use crate::types::{Allocation, AllocationInput, Amount};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationIssue {
    EmptyAllocationList,
    TooManyRecipients { count: usize, max: usize },
    InvalidAddress { index: usize, address: String, reason: String },
    ZeroAddress { index: usize },
    InvalidAmount { index: usize, amount: String, reason: String },
    ZeroAmount { index: usize },
    AmountExceedsMax { index: usize, amount: String, max: Amount },
    DuplicateAddress { first_index: usize, index: usize, address: String },
    TotalOverflow { index: usize },
    InvalidDuration { days: u64, max: u64 },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAllocationList => write!(f, "allocation list is empty"),
            Self::TooManyRecipients { count, max } => {
                write!(f, "{count} recipients exceeds the maximum of {max}")
            }
            Self::InvalidAddress { index, address, reason } => {
                write!(f, "entry {index}: invalid address '{address}': {reason}")
            }
            Self::ZeroAddress { index } => write!(f, "entry {index}: zero address is not allowed"),
            Self::InvalidAmount { index, amount, reason } => {
                write!(f, "entry {index}: invalid amount '{amount}': {reason}")
            }
            Self::ZeroAmount { index } => write!(f, "entry {index}: amount must be positive"),
            Self::AmountExceedsMax { index, amount, max } => {
                write!(f, "entry {index}: amount {amount} exceeds per-recipient maximum {max}")
            }
            Self::DuplicateAddress { first_index, index, address } => write!(
                f,
                "entries {first_index} and {index}: duplicate address {address}"
            ),
            Self::TotalOverflow { index } => {
                write!(f, "entry {index}: running total overflows 128 bits")
            }
            Self::InvalidDuration { days, max } => {
                write!(f, "duration of {days} days must be between 1 and {max}")
            }
        }
    }
}

/// Result of validating an allocation list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn single(issue: ValidationIssue) -> Self {
        Self { issues: vec![issue] }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "; {issue}")?;
        }
        Ok(())
    }
}

/// Allocations that passed validation, in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAllocations {
    allocations: Vec<Allocation>,
    total_amount: Amount,
}

impl ValidatedAllocations {
    #[must_use]
    pub fn as_slice(&self) -> &[Allocation] {
        &self.allocations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    #[must_use]
    pub fn total_amount(&self) -> Amount {
        self.total_amount
    }
}

#[derive(Debug, Clone, Default)]
pub struct AllocationValidator {
    config: ValidationConfig,
}

impl AllocationValidator {
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Checks every rule and reports all violations.
    #[must_use]
    pub fn validate(&self, inputs: &[AllocationInput]) -> ValidationReport {
        self.check(inputs).1
    }

    /// Validates and, if clean, returns the parsed allocations.
    ///
    /// # Errors
    ///
    /// [`DistributorError::Validation`] carrying the full report.
    pub fn validated(&self, inputs: &[AllocationInput]) -> Result<ValidatedAllocations, DistributorError> {
        let (allocations, report) = self.check(inputs);
        if !report.is_valid() {
            warn!("Rejected allocation list: {report}");
            return Err(DistributorError::Validation(report));
        }

        let total_amount = allocations.iter().map(|a| a.amount).sum();
        debug!(
            "Validated {} allocations totalling {}",
            allocations.len(),
            total_amount
        );
        Ok(ValidatedAllocations {
            allocations,
            total_amount,
        })
    }

    fn check(&self, inputs: &[AllocationInput]) -> (Vec<Allocation>, ValidationReport) {
        let mut issues = Vec::new();

        if inputs.is_empty() {
            issues.push(ValidationIssue::EmptyAllocationList);
        }
        if inputs.len() > self.config.max_recipients {
            issues.push(ValidationIssue::TooManyRecipients {
                count: inputs.len(),
                max: self.config.max_recipients,
            });
        }

        let mut seen: HashMap<Address, usize> = HashMap::with_capacity(inputs.len());
        let mut allocations = Vec::with_capacity(inputs.len());
        let mut total: Amount = 0;

        for (index, input) in inputs.iter().enumerate() {
            let address = self.check_address(index, &input.address, &mut issues);
            let amount = self.check_amount(index, &input.amount, &mut issues);

            if let Some(address) = address {
                if let Some(&first_index) = seen.get(&address) {
                    issues.push(ValidationIssue::DuplicateAddress {
                        first_index,
                        index,
                        address: address.to_string(),
                    });
                } else {
                    seen.insert(address, index);
                }
            }

            if let Some(amount) = amount {
                match total.checked_add(amount) {
                    Some(t) => total = t,
                    None => issues.push(ValidationIssue::TotalOverflow { index }),
                }
            }

            if let (Some(address), Some(amount)) = (address, amount) {
                allocations.push(Allocation { address, amount });
            }
        }

        (allocations, ValidationReport { issues })
    }

    fn check_address(
        &self,
        index: usize,
        raw: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Address> {
        if raw.trim().is_empty() {
            issues.push(ValidationIssue::InvalidAddress {
                index,
                address: raw.to_string(),
                reason: "address is empty".to_string(),
            });
            return None;
        }

        match Address::parse(raw) {
            Ok(address) if address.is_zero() && !self.config.allow_zero_address => {
                issues.push(ValidationIssue::ZeroAddress { index });
                None
            }
            Ok(address) => Some(address),
            Err(e) => {
                issues.push(ValidationIssue::InvalidAddress {
                    index,
                    address: raw.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn check_amount(
        &self,
        index: usize,
        raw: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Amount> {
        let trimmed = raw.trim();
        let invalid = |reason: &str| ValidationIssue::InvalidAmount {
            index,
            amount: raw.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            issues.push(invalid("amount is empty"));
            return None;
        }
        if trimmed.starts_with('-') {
            issues.push(invalid("amount is negative"));
            return None;
        }
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            issues.push(invalid("amount must be a base-10 integer"));
            return None;
        }

        let max = self.config.max_amount_per_recipient;
        let amount = match trimmed.parse::<Amount>() {
            Ok(a) => a,
            // Only digits remain, so the sole failure mode is overflow.
            Err(_) => {
                issues.push(ValidationIssue::AmountExceedsMax {
                    index,
                    amount: raw.to_string(),
                    max,
                });
                return None;
            }
        };

        if amount == 0 {
            issues.push(ValidationIssue::ZeroAmount { index });
            return None;
        }
        if amount > max {
            issues.push(ValidationIssue::AmountExceedsMax {
                index,
                amount: raw.to_string(),
                max,
            });
            return None;
        }
        Some(amount)
    }

    /// Re-applies this validator's limits to a list validated elsewhere, possibly
    /// under a looser configuration.
    pub fn check_limits(&self, allocations: &ValidatedAllocations) -> Result<(), DistributorError> {
        let mut issues = Vec::new();
        if allocations.len() > self.config.max_recipients {
            issues.push(ValidationIssue::TooManyRecipients {
                count: allocations.len(),
                max: self.config.max_recipients,
            });
        }
        for (index, allocation) in allocations.as_slice().iter().enumerate() {
            if allocation.address.is_zero() && !self.config.allow_zero_address {
                issues.push(ValidationIssue::ZeroAddress { index });
            }
            if allocation.amount > self.config.max_amount_per_recipient {
                issues.push(ValidationIssue::AmountExceedsMax {
                    index,
                    amount: allocation.amount.to_string(),
                    max: self.config.max_amount_per_recipient,
                });
            }
        }

        if issues.is_empty() {
            return Ok(());
        }
        let report = ValidationReport { issues };
        warn!("Validated allocations exceed configured limits: {report}");
        Err(DistributorError::Validation(report))
    }

    /// Checks a requested duration against the configured bounds.
    pub fn check_duration(&self, days: u64, max_days: u64) -> Result<(), DistributorError> {
        if days == 0 || days > max_days {
            return Err(DistributorError::Validation(ValidationReport::single(
                ValidationIssue::InvalidDuration { days, max: max_days },
            )));
        }
        Ok(())
    }
}
