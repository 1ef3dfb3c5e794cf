use crate::error::SweepError;
use std::fmt::Display;
use std::str::FromStr;

/// Build an ASCII command from a mnemonic and comma-separated parameters.
///
/// `format_command("WSET", &[1500.0, 1600.0, 0.1])` yields `"WSET 1500,1600,0.1"`.
/// A mnemonic without parameters is passed through unchanged.
pub fn format_command<D: Display>(mnemonic: &str, params: &[D]) -> String {
    if params.is_empty() {
        return mnemonic.to_string();
    }

    let joined = params
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");

    format!("{mnemonic} {joined}")
}

/// Parse a single numeric or enum-coded token from an instrument response.
///
/// Terminator remnants and surrounding whitespace are stripped before parsing.
pub fn parse_scalar<T: FromStr>(response: &str) -> Result<T, SweepError> {
    let token = response.trim();
    token.parse::<T>().map_err(|_| {
        SweepError::Parse(format!(
            "cannot parse {:?} as {}",
            token,
            std::any::type_name::<T>()
        ))
    })
}

/// Split a comma-separated response into trimmed fields.
///
/// Used for multi-field responses such as `STAT?` (`<status>,<count>`) and
/// `ERR?` (`<code>,<message>`).
pub fn parse_tuple(response: &str) -> Vec<&str> {
    response.trim().split(',').map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_command_without_params() {
        let none: &[f64] = &[];
        assert_eq!(format_command("MEAS", none), "MEAS");
    }

    #[test]
    fn format_command_joins_params_with_commas() {
        assert_eq!(
            format_command("WSET", &[1500.0, 1600.0, 0.1]),
            "WSET 1500,1600,0.1"
        );
        assert_eq!(format_command("LOGG?", &[0, 1]), "LOGG? 0,1");
    }

    #[test]
    fn parse_scalar_accepts_terminator_remnants() {
        assert_eq!(parse_scalar::<i32>("3\r\n").unwrap(), 3);
        assert_eq!(parse_scalar::<f64>(" 1550.025 ").unwrap(), 1550.025);
    }

    #[test]
    fn parse_scalar_rejects_non_numeric_token() {
        let err = parse_scalar::<u32>("SWEEP1").unwrap_err();
        assert!(matches!(err, SweepError::Parse(_)));
    }

    #[test]
    fn parse_tuple_splits_and_trims() {
        assert_eq!(parse_tuple("1,100\r"), vec!["1", "100"]);
        assert_eq!(parse_tuple("0, No error"), vec!["0", "No error"]);
    }
}
