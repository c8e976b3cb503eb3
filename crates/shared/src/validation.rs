//! Common validation utilities.

use std::net::IpAddr;
use validator::ValidationError;

lazy_static::lazy_static! {
    /// Dotted action names such as `auth.login` or `phi.record_read`.
    pub static ref ACTION_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)+$").unwrap();
}

const REQUEST_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "CONNECT", "TRACE",
];

/// Validates an audit action name (`resource.operation`, lowercase).
pub fn validate_action_name(action: &str) -> Result<(), ValidationError> {
    if ACTION_REGEX.is_match(action) {
        Ok(())
    } else {
        let mut err = ValidationError::new("action_format");
        err.message = Some("Action must look like 'resource.operation'".into());
        Err(err)
    }
}

/// Validates that a string is an IPv4 or IPv6 address.
pub fn validate_ip_address(ip: &str) -> Result<(), ValidationError> {
    if ip.parse::<IpAddr>().is_ok() {
        Ok(())
    } else {
        let mut err = ValidationError::new("ip_address");
        err.message = Some("IP address must be a valid IPv4 or IPv6 address".into());
        Err(err)
    }
}

/// Validates an HTTP request method (uppercase).
pub fn validate_request_method(method: &str) -> Result<(), ValidationError> {
    if REQUEST_METHODS.contains(&method) {
        Ok(())
    } else {
        let mut err = ValidationError::new("request_method");
        err.message = Some("Request method must be an uppercase HTTP verb".into());
        Err(err)
    }
}
