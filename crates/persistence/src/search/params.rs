//! Search parameter value parsing: comparison prefixes and token forms.

/// Control parameters the engine accepts; anything else starting with `_`
/// is an unsupported-parameter error. `page` is handled by the HTTP layer.
pub const CONTROL_WHITELIST: &[&str] = &[
    "_id",
    "_lastUpdated",
    "_profile",
    "_include",
    "_revinclude",
    "_count",
];

/// The two-letter comparison prefixes of date and number parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Sa,
    Eb,
}

impl Prefix {
    /// Splits a value into its prefix and remainder; a missing prefix
    /// defaults to `eq`.
    pub fn split(value: &str) -> (Prefix, &str) {
        if value.len() > 2 && value.is_char_boundary(2) {
            let (head, rest) = value.split_at(2);
            let prefix = match head {
                "eq" => Some(Prefix::Eq),
                "ne" => Some(Prefix::Ne),
                "gt" => Some(Prefix::Gt),
                "ge" => Some(Prefix::Ge),
                "lt" => Some(Prefix::Lt),
                "le" => Some(Prefix::Le),
                "sa" => Some(Prefix::Sa),
                "eb" => Some(Prefix::Eb),
                _ => None,
            };
            if let Some(prefix) = prefix {
                return (prefix, rest);
            }
        }
        (Prefix::Eq, value)
    }

    /// The SQL comparison operator for this prefix.
    pub fn op(&self) -> &'static str {
        match self {
            Prefix::Eq => "=",
            Prefix::Ne => "!=",
            Prefix::Gt | Prefix::Sa => ">",
            Prefix::Ge => ">=",
            Prefix::Lt | Prefix::Eb => "<",
            Prefix::Le => "<=",
        }
    }
}

/// How a token query constrains the system part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemFilter {
    /// `code`: any system matches.
    Any,
    /// `|code`: only values without a system match.
    Missing,
    /// `sys|code` or `sys|`: this exact system.
    Is(String),
}

/// A parsed token query value, covering the four FHIR forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenQuery {
    pub system: SystemFilter,
    pub code: Option<String>,
}

/// Parses `code`, `sys|code`, `|code`, and `sys|`.
pub fn parse_token(value: &str) -> TokenQuery {
    match value.split_once('|') {
        None => TokenQuery {
            system: SystemFilter::Any,
            code: Some(value.to_string()),
        },
        Some(("", code)) => TokenQuery {
            system: SystemFilter::Missing,
            code: Some(code.to_string()),
        },
        Some((system, "")) => TokenQuery {
            system: SystemFilter::Is(system.to_string()),
            code: None,
        },
        Some((system, code)) => TokenQuery {
            system: SystemFilter::Is(system.to_string()),
            code: Some(code.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_splitting() {
        assert_eq!(Prefix::split("ge1980"), (Prefix::Ge, "1980"));
        assert_eq!(Prefix::split("lt2024-01-01"), (Prefix::Lt, "2024-01-01"));
        assert_eq!(Prefix::split("1980"), (Prefix::Eq, "1980"));
        // A bare two-letter value is not a prefix.
        assert_eq!(Prefix::split("ge"), (Prefix::Eq, "ge"));
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(Prefix::Eq.op(), "=");
        assert_eq!(Prefix::Ne.op(), "!=");
        assert_eq!(Prefix::Sa.op(), ">");
        assert_eq!(Prefix::Eb.op(), "<");
        assert_eq!(Prefix::Ge.op(), ">=");
    }

    #[test]
    fn token_forms() {
        assert_eq!(
            parse_token("male"),
            TokenQuery {
                system: SystemFilter::Any,
                code: Some("male".to_string())
            }
        );
        assert_eq!(
            parse_token("http://loinc.org|1234-5"),
            TokenQuery {
                system: SystemFilter::Is("http://loinc.org".to_string()),
                code: Some("1234-5".to_string())
            }
        );
        assert_eq!(
            parse_token("|1234-5"),
            TokenQuery {
                system: SystemFilter::Missing,
                code: Some("1234-5".to_string())
            }
        );
        assert_eq!(
            parse_token("http://loinc.org|"),
            TokenQuery {
                system: SystemFilter::Is("http://loinc.org".to_string()),
                code: None
            }
        );
    }
}
