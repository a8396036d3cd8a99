//! Utility functions.

use thiserror::Error;

/// Error returned when a memory quantity string cannot be interpreted.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("invalid memory quantity \"{0}\"")]
pub struct ParseMemoryError(pub String);

/// Parses a memory quantity string into gigabytes.
///
/// Accepts Kubernetes-style quantities: binary suffixes (`Ki`, `Mi`, `Gi`,
/// `Ti`) count in powers of 1024, decimal suffixes (`K`/`KB`, `M`/`MB`,
/// `G`/`GB`, `T`/`TB`) in powers of 1000, a bare number counts bytes.
/// The result is expressed in decimal gigabytes.
pub fn parse_memory_gb(s: &str) -> Result<f64, ParseMemoryError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let value: f64 = number.parse().map_err(|_| ParseMemoryError(s.to_string()))?;
    if value < 0. {
        return Err(ParseMemoryError(s.to_string()));
    }
    let bytes = match suffix.trim() {
        "" | "B" => value,
        "Ki" => value * 1024.,
        "Mi" => value * 1024f64.powi(2),
        "Gi" => value * 1024f64.powi(3),
        "Ti" => value * 1024f64.powi(4),
        "K" | "KB" => value * 1e3,
        "M" | "MB" => value * 1e6,
        "G" | "GB" => value * 1e9,
        "T" | "TB" => value * 1e12,
        _ => return Err(ParseMemoryError(s.to_string())),
    };
    Ok(bytes / 1e9)
}

/// Builds the deterministic container name for a deployment.
///
/// Spaces in the service name are replaced so the name stays valid for
/// container runtimes.
pub fn container_name(edge_id: &str, subscription_id: &str, service_name: &str) -> String {
    format!("{}_{}_{}", edge_id, subscription_id, service_name.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_quantities() {
        assert_eq!(parse_memory_gb("2GB").unwrap(), 2.0);
        assert_eq!(parse_memory_gb("3G").unwrap(), 3.0);
        assert_eq!(parse_memory_gb("500MB").unwrap(), 0.5);
        assert_eq!(parse_memory_gb("1.5G").unwrap(), 1.5);
        assert_eq!(parse_memory_gb("0").unwrap(), 0.0);
    }

    #[test]
    fn parse_binary_quantities() {
        assert_eq!(parse_memory_gb("1Gi").unwrap(), 1.073741824);
        assert_eq!(parse_memory_gb("512Mi").unwrap(), 0.536870912);
        assert_eq!(parse_memory_gb("2048Ki").unwrap(), 2048. * 1024. / 1e9);
    }

    #[test]
    fn parse_bare_bytes() {
        assert_eq!(parse_memory_gb("1000000000").unwrap(), 1.0);
        assert_eq!(parse_memory_gb(" 2GB ").unwrap(), 2.0);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_memory_gb("abc").is_err());
        assert!(parse_memory_gb("2XB").is_err());
        assert!(parse_memory_gb("-1G").is_err());
        assert!(parse_memory_gb("").is_err());
    }

    #[test]
    fn container_name_replaces_spaces() {
        assert_eq!(
            container_name("bs_001_edge", "sub_42", "face expression"),
            "bs_001_edge_sub_42_face_expression"
        );
    }
}
