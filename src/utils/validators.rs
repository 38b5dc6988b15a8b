//! Custom field validators and the mapping of validation failures to reply messages.
//!
//! The validators plug into `validator`'s derive:
//!
//! ```rust,ignore
//! use service_helper::one_of;
//! use service_helper::utils::validators::{is_active_email, is_url};
//!
//! one_of!(user_type, "employee/customer/vendor");
//!
//! #[derive(Deserialize, Validate)]
//! struct User {
//!     #[validate(length(min = 1, code = "required"))]
//!     full_name: String,
//!     #[validate(custom(function = "user_type"))]
//!     r#type: String,
//!     #[validate(custom(function = "is_url"))]
//!     website: Option<String>,
//!     #[validate(custom(function = "is_active_email"))]
//!     email: String,
//! }
//! ```
//!
//! `is_url` and `is_active_email` perform blocking DNS lookups; run validation
//! through [`crate::api::extract::ValidatedJson`], which moves it off the async
//! workers.

use std::borrow::Cow;
use std::sync::OnceLock;

use hickory_resolver::Resolver;
use url::{Host, Url};
use validator::{ValidateEmail, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::api::dto::envelope::FieldError;

/// Error code emitted by [`check_one_of`].
pub const ENUM_CODE: &str = "enum";

static VERIFIER_EMAIL: OnceLock<String> = OnceLock::new();
static RESOLVER: OnceLock<Option<Resolver>> = OnceLock::new();

/// Registers the sender address reported alongside MX verification.
///
/// Only the first call takes effect.
pub fn set_verifier_email(email: impl Into<String>) {
    let _ = VERIFIER_EMAIL.set(email.into());
}

/// Sender address used for email verification, if one was registered.
pub fn verifier_email() -> Option<&'static str> {
    VERIFIER_EMAIL.get().map(String::as_str)
}

/// Normalizes user input into a URL: trims, lowercases, drops the first `www.`
/// and assumes `http://` when no scheme is given.
pub fn normalize_url(input: &str) -> Option<Url> {
    let data = input.trim().to_lowercase().replacen("www.", "", 1);
    if data.is_empty() {
        return None;
    }

    let parsed = match Url::parse(&data) {
        Ok(url) if url.host_str().is_some() => Some(url),
        _ => Url::parse(&format!("http://{data}")).ok(),
    };

    parsed.filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
}

/// Valid when the value parses as a URL and its host resolves.
///
/// IP literals count as resolved.
pub fn is_url(value: &str) -> Result<(), ValidationError> {
    let Some(url) = normalize_url(value) else {
        return Err(ValidationError::new("is_url"));
    };

    let domain = match url.host() {
        Some(Host::Domain(domain)) => domain,
        Some(Host::Ipv4(_) | Host::Ipv6(_)) => return Ok(()),
        None => return Err(ValidationError::new("is_url")),
    };

    let Some(resolver) = resolver() else {
        return Err(ValidationError::new("is_url"));
    };

    match resolver.lookup_ip(format!("{domain}.")) {
        Ok(addrs) if addrs.iter().next().is_some() => Ok(()),
        Ok(_) => Err(ValidationError::new("is_url")),
        Err(e) => {
            tracing::debug!(host = domain, error = %e, "host lookup failed");
            Err(ValidationError::new("is_url"))
        }
    }
}

fn resolver() -> Option<&'static Resolver> {
    RESOLVER
        .get_or_init(|| match Resolver::from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                tracing::warn!(error = %e, "system resolver unavailable, falling back to defaults");
                Resolver::default().ok()
            }
        })
        .as_ref()
}

/// Valid when the address is well formed and its domain has at least one MX record.
pub fn is_active_email(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if !value.validate_email() {
        return Err(ValidationError::new("email"));
    }

    let Some((_, domain)) = value.rsplit_once('@') else {
        return Err(ValidationError::new("email"));
    };

    let Some(resolver) = resolver() else {
        return Err(ValidationError::new("is_active_email"));
    };

    match resolver.mx_lookup(format!("{domain}.")) {
        Ok(records) if records.iter().next().is_some() => {
            tracing::debug!(domain, verifier = ?verifier_email(), "mx lookup succeeded");
            Ok(())
        }
        Ok(_) => Err(ValidationError::new("is_active_email")),
        Err(e) => {
            tracing::debug!(domain, error = %e, "mx lookup failed");
            Err(ValidationError::new("is_active_email"))
        }
    }
}

/// Valid when `value` equals one of the slash-separated `allowed` tokens.
///
/// Tokens are trimmed before comparison; an empty value never matches.
pub fn check_one_of(value: &str, allowed: &'static str) -> Result<(), ValidationError> {
    if !value.is_empty() && allowed.split('/').any(|token| token.trim() == value) {
        return Ok(());
    }

    let mut err = ValidationError::new(ENUM_CODE);
    err.add_param(Cow::from("values"), &allowed);
    Err(err)
}

/// Declares a validator function accepting one of a fixed set of values.
///
/// ```rust,ignore
/// one_of!(user_status, "active/inactive");
/// // fn user_status(value: &str) -> Result<(), validator::ValidationError>
/// ```
#[macro_export]
macro_rules! one_of {
    ($vis:vis $name:ident, $allowed:literal) => {
        $vis fn $name(value: &str) -> ::std::result::Result<(), ::validator::ValidationError> {
            $crate::utils::validators::check_one_of(value, $allowed)
        }
    };
}

/// Converts `snake_case` (or `PascalCase`) field names to `lowerCamel`.
pub fn lower_camel(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper_next = false;

    for (i, c) in field.chars().enumerate() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if i == 0 || out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

fn message_for(field: &str, error: &ValidationError) -> String {
    match error.code.as_ref() {
        "required" => format!("{field} is required"),
        "email" => format!("{field} is not valid email"),
        ENUM_CODE => {
            let values = error
                .params
                .get("values")
                .and_then(|v| v.as_str())
                .map(|v| v.split('/').map(str::trim).collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            format!("{field} must be one of: {values}")
        }
        _ => format!("{field} is not valid"),
    }
}

fn collect(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (name, kind) in errors.errors() {
        let name = lower_camel(name.trim_start_matches("r#"));
        let field = match prefix {
            Some(p) => format!("{p}.{name}"),
            None => name,
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                out.extend(list.iter().map(|e| FieldError {
                    message: message_for(&field, e),
                    field: field.clone(),
                }));
            }
            ValidationErrorsKind::Struct(nested) => collect(Some(&field), nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(Some(&format!("{field}[{index}]")), nested, out);
                }
            }
        }
    }
}

/// Flattens validation failures into reply entries, ordered by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect(None, errors, &mut out);
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}
