use crate::error::{BadRequest, ParameterError, QueryError};

/// The `count` option: whether the pre-paging total is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountOption(bool);

impl CountOption {
    pub const PARAMETER: &'static str = "count";

    /// Accepts `true` or `false`; absence means `false`.
    pub fn parse(raw: Option<&str>) -> Result<Self, BadRequest> {
        match raw.map(str::trim) {
            None | Some("false") => Ok(Self(false)),
            Some("true") => Ok(Self(true)),
            Some(_) => Err(ParameterError::new(
                Self::PARAMETER,
                QueryError::invalid_value(raw.unwrap_or_default(), "expected 'true' or 'false'"),
            )
            .into()),
        }
    }

    pub fn new(requested: bool) -> Self {
        Self(requested)
    }

    pub fn requested(self) -> bool {
        self.0
    }
}
