use url::Url;

use validator::ValidationError;

use crate::utils::code_generator::ALPHABET;

/// Validates that a URL string is absolute and uses http/https
pub fn validate_url(url_str: &str) -> Result<(), ValidationError> {
    match Url::parse(url_str.trim()) {
        Ok(url) => {
            // Ensure URL has a scheme and host
            if url.scheme().is_empty() || url.host().is_none() {
                let mut err = ValidationError::new("url_host");
                err.message = Some("URL must have a scheme and host".into());
                return Err(err);
            }

            // Only accept HTTP and HTTPS URLs
            if url.scheme() != "http" && url.scheme() != "https" {
                let mut err = ValidationError::new("url_scheme");
                err.message = Some("URL scheme must be http or https".into());
                return Err(err);
            }

            Ok(())
        }
        Err(_) => {
            let mut err = ValidationError::new("url_format");
            err.message = Some("Invalid URL format".into());
            Err(err)
        }
    }
}

/// Cheap pre-check for redirect paths: anything outside the code alphabet
/// can never have been allocated, so it is not worth a store round trip.
pub fn is_short_code_shaped(code: &str) -> bool {
    !code.is_empty() && code.len() <= 32 && code.bytes().all(|b| ALPHABET.contains(&b))
}
