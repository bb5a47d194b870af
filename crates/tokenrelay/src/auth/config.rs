//! Verifier configuration

/// Expected token issuer and audience.
///
/// Both are compared with exact string equality: no trailing-slash
/// normalization and no wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub issuer: String,
    pub audience: String,
}

impl VerifierConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }
}
