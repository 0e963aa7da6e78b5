use std::fmt;

use crate::error::{BadRequest, ParameterError, QueryError};

fn parse_non_negative(parameter: &'static str, text: &str) -> Result<usize, ParameterError> {
    let trimmed = text.trim();
    let invalid = |reason: &str| {
        ParameterError::new(parameter, QueryError::invalid_value(text, reason))
    };
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("must be a non-negative integer"));
    }
    trimmed
        .parse::<usize>()
        .map_err(|_| invalid("integer out of range"))
}

/// The `skip` option: number of records to drop, 0 by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipOption(usize);

impl SkipOption {
    pub const PARAMETER: &'static str = "skip";

    pub fn parse(raw: Option<&str>) -> Result<Self, BadRequest> {
        match raw {
            None => Ok(Self::default()),
            Some(text) => Ok(Self(parse_non_negative(Self::PARAMETER, text)?)),
        }
    }

    pub fn new(skip: usize) -> Self {
        Self(skip)
    }

    pub fn value(self) -> usize {
        self.0
    }

    /// `true` when nothing is skipped.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SkipOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `top` option: maximum number of records to return, unlimited by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopOption(Option<usize>);

impl TopOption {
    pub const PARAMETER: &'static str = "top";

    /// Parses `raw`, rejecting values above `max` when a bound is configured.
    pub fn parse(raw: Option<&str>, max: Option<usize>) -> Result<Self, BadRequest> {
        let Some(text) = raw else {
            return Ok(Self::default());
        };
        let top = parse_non_negative(Self::PARAMETER, text)?;
        if let Some(max) = max.filter(|&max| top > max) {
            return Err(ParameterError::new(
                Self::PARAMETER,
                QueryError::invalid_value(text, format!("exceeds the maximum of {max}")),
            )
            .into());
        }
        Ok(Self(Some(top)))
    }

    pub fn new(top: usize) -> Self {
        Self(Some(top))
    }

    pub fn value(self) -> Option<usize> {
        self.0
    }
}

impl fmt::Display for TopOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(top) => write!(f, "{top}"),
            None => Ok(()),
        }
    }
}
