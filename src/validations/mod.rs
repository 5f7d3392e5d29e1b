mod url;

pub use url::{is_short_code_shaped, validate_url};
