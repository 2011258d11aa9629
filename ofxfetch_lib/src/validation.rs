//! Structural checks on a downloaded statement.
//!
//! The text is upper-cased and stripped of CR, LF and spaces before the checks
//! run. Validation never touches the file; a rejected file stays on disk so it
//! can be inspected.

use std::path::{Path, PathBuf};

use thiserror::Error;

const HEADER_MARKER: &str = "OFXHEADER:";
const ROOT_OPEN: &str = "<OFX>";
const ROOT_CLOSE: &str = "</OFX>";
const SEVERITY_ERROR: &str = "<SEVERITY>ERROR";
const POSITION_MARKER: &str = "<INVPOS>";
const SECURITY_LIST_MARKER: &str = "<SECLIST>";

/// Why a statement was rejected. Every variant names the offending file.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("could not read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Header or root element missing: not a protocol document at all.
    #[error("{} is not a valid statement (missing {missing})", .path.display())]
    MissingEnvelope {
        path: PathBuf,
        missing: &'static str,
    },
    /// The server flagged an application error in its reply.
    #[error("{} contains a server ERROR condition", .path.display())]
    ServerError { path: PathBuf },
    /// Positions were reported without the security list they refer to.
    #[error("{} has positions but is missing the required <SECLIST> section", .path.display())]
    MissingSecurityList { path: PathBuf },
}

impl ValidationError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Unreadable { path, .. }
            | Self::MissingEnvelope { path, .. }
            | Self::ServerError { path }
            | Self::MissingSecurityList { path } => path,
        }
    }

    /// `true` for the protocol-level failures (malformed reply, server error),
    /// `false` for a missing paired section or an unreadable file.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::MissingEnvelope { .. } | Self::ServerError { .. })
    }
}

/// Reads `path` and runs [`validate_text`] on its contents.
pub fn validate_file(path: &Path) -> Result<(), ValidationError> {
    let bytes = std::fs::read(path).map_err(|source| ValidationError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    validate_text(&String::from_utf8_lossy(&bytes), path)
}

/// Runs the structural checks on a statement's text. `path` is only used for
/// error reporting.
pub fn validate_text(text: &str, path: &Path) -> Result<(), ValidationError> {
    let content = normalize(text);

    for marker in [HEADER_MARKER, ROOT_OPEN, ROOT_CLOSE] {
        if !content.contains(marker) {
            return Err(ValidationError::MissingEnvelope {
                path: path.to_path_buf(),
                missing: marker,
            });
        }
    }

    if content.contains(SEVERITY_ERROR) {
        return Err(ValidationError::ServerError {
            path: path.to_path_buf(),
        });
    }

    // Some servers omit the security list when a period has no transactions.
    if content.contains(POSITION_MARKER) && !content.contains(SECURITY_LIST_MARKER) {
        return Err(ValidationError::MissingSecurityList {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | ' '))
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "OFXHEADER:100\r\nDATA:OFXSGML\r\n\r\n<OFX>\r\n<SIGNONMSGSRSV1><SONRS><STATUS><CODE>0<SEVERITY>INFO</STATUS></SONRS></SIGNONMSGSRSV1>\r\n</OFX>\r\n";

    fn p() -> &'static Path {
        Path::new("xfr/test.ofx")
    }

    #[test]
    fn accepts_well_formed_document() {
        assert!(validate_text(GOOD, p()).is_ok());
    }

    #[test]
    fn case_and_spacing_are_ignored() {
        let text = "ofxheader: 100\n< ofx >\n<code>0\n</ofx >";
        assert!(validate_text(text, p()).is_ok());
    }

    #[test]
    fn rejects_missing_closing_root() {
        let text = GOOD.replace("</OFX>", "");
        let err = validate_text(&text, p()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingEnvelope { missing: "</OFX>", .. }
        ));
        assert!(err.is_protocol_error());
        assert_eq!(err.path(), p());
    }

    #[test]
    fn rejects_missing_header() {
        let text = GOOD.replace("OFXHEADER:100", "");
        assert!(matches!(
            validate_text(&text, p()),
            Err(ValidationError::MissingEnvelope { missing: "OFXHEADER:", .. })
        ));
    }

    #[test]
    fn rejects_severity_error() {
        let text = GOOD.replace("<SEVERITY>INFO", "<SEVERITY>ERROR");
        let err = validate_text(&text, p()).unwrap_err();
        assert!(matches!(err, ValidationError::ServerError { .. }));
        assert!(err.to_string().contains("xfr/test.ofx"));
    }

    #[test]
    fn rejects_positions_without_security_list() {
        let text = GOOD.replace(
            "</OFX>",
            "<INVSTMTMSGSRSV1><INVPOSLIST><POSSTOCK><INVPOS><UNITS>1</INVPOS></POSSTOCK></INVPOSLIST></INVSTMTMSGSRSV1></OFX>",
        );
        let err = validate_text(&text, p()).unwrap_err();
        assert!(matches!(err, ValidationError::MissingSecurityList { .. }));
        assert!(!err.is_protocol_error());
    }

    #[test]
    fn position_list_marker_alone_does_not_require_seclist() {
        let text = GOOD.replace("</OFX>", "<INVPOSLIST></INVPOSLIST></OFX>");
        assert!(validate_text(&text, p()).is_ok());
    }

    #[test]
    fn positions_with_security_list_pass() {
        let text = GOOD.replace(
            "</OFX>",
            "<INVPOS><UNITS>1</INVPOS><SECLISTMSGSRSV1><SECLIST></SECLIST></SECLISTMSGSRSV1></OFX>",
        );
        assert!(validate_text(&text, p()).is_ok());
    }

    #[test]
    fn validate_file_never_mutates_or_deletes() {
        let path = std::env::temp_dir().join(format!(
            "ofxfetch-validate-{}.ofx",
            std::process::id()
        ));
        let bad = GOOD.replace("<SEVERITY>INFO", "<SEVERITY>ERROR");
        std::fs::write(&path, &bad).unwrap();
        assert!(validate_file(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), bad);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = validate_file(Path::new("/definitely/not/here.ofx")).unwrap_err();
        assert!(matches!(err, ValidationError::Unreadable { .. }));
    }
}
