// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Validation of the payload that creates a site. Every rule is checked and
//! every violation is reported with the field it belongs to.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

static SUI_ADDRESS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[a-fA-F0-9]{64}$").expect("Address regex should compile"));
static NUMERIC_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("Numeric regex should compile"));

const MIN_COMMAND_LENGTH: usize = 3;

const OWNERSHIP_VALUES: [&str; 2] = ["0", "1"];
const STATUS_VALUES: [&str; 3] = ["0", "1", "2"];
const IS_BUILD_VALUES: [&str; 2] = ["0", "1"];

const NAIVE_DATE_TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// The create-site payload. Absent fields deserialize as empty strings so
/// that they are reported by the rule of their field.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct CreateSiteRequest {
    #[serde(rename = "site-name")]
    pub site_name: String,
    pub owner: String,
    pub ownership: String,
    pub send_to: String,
    pub epochs: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub cache: String,
    pub root: String,
    pub install_command: String,
    pub build_command: String,
    pub default_route: String,
    pub is_build: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sui_ns: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

/// A single rule violation
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

/// All rule violations of a payload
#[derive(Clone, Debug, Default, Deserialize, Error, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    fn add(&mut self, path: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: path.to_owned(),
            message: message.into(),
        });
    }

    /// Returns the issues reported for the given field
    pub fn issues_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let issues: Vec<String> = self
            .issues
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect();
        write!(f, "invalid create-site request ({})", issues.join("; "))
    }
}

impl CreateSiteRequest {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.site_name.is_empty() {
            errors.add("site-name", "site name must not be empty");
        }

        check_address(&mut errors, "owner", &self.owner);
        check_address(&mut errors, "send_to", &self.send_to);
        if let Some(sui_ns) = &self.sui_ns {
            check_address(&mut errors, "sui_ns", sui_ns);
        }

        check_one_of(&mut errors, "ownership", &self.ownership, &OWNERSHIP_VALUES);
        check_one_of(&mut errors, "status", &self.status, &STATUS_VALUES);
        check_one_of(&mut errors, "is_build", &self.is_build, &IS_BUILD_VALUES);

        check_numeric(&mut errors, "epochs", &self.epochs);
        check_numeric(&mut errors, "cache", &self.cache);

        check_route(&mut errors, "root", &self.root);
        check_route(&mut errors, "default_route", &self.default_route);

        check_command(&mut errors, "install_command", &self.install_command);
        check_command(&mut errors, "build_command", &self.build_command);

        let start = parse_date(&self.start_date);
        if start.is_none() {
            errors.add("start_date", "Invalid start_date");
        }
        let end = parse_date(&self.end_date);
        if end.is_none() {
            errors.add("end_date", "Invalid end_date");
        }
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                errors.add("end_date", "end_date must be after start_date");
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_address(errors: &mut ValidationErrors, path: &str, value: &str) {
    if !SUI_ADDRESS_REGEX.is_match(value) {
        errors.add(path, "must be 0x followed by 64 hex characters");
    }
}

fn check_one_of(errors: &mut ValidationErrors, path: &str, value: &str, allowed: &[&str]) {
    if !allowed.contains(&value) {
        errors.add(
            path,
            format!("must be one of {}", allowed.join(", ")),
        );
    }
}

fn check_numeric(errors: &mut ValidationErrors, path: &str, value: &str) {
    if !NUMERIC_REGEX.is_match(value) {
        errors.add(path, "must be a non-negative integer");
    }
}

fn check_route(errors: &mut ValidationErrors, path: &str, value: &str) {
    if !value.starts_with('/') {
        errors.add(path, "must start with '/'");
    }
}

fn check_command(errors: &mut ValidationErrors, path: &str, value: &str) {
    if value.chars().count() < MIN_COMMAND_LENGTH {
        errors.add(
            path,
            format!("must contain at least {} characters", MIN_COMMAND_LENGTH),
        );
    }
}

/// Parses RFC 3339, RFC 2822, plain dates and date-times without an offset.
/// Dates without an offset are taken as UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
        return Some(date_time.with_timezone(&Utc));
    }
    if let Ok(date_time) = DateTime::parse_from_rfc2822(value) {
        return Some(date_time.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(date_time) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&date_time));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date_time| Utc.from_utc_datetime(&date_time))
}
