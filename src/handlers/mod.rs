mod url;

pub use url::{redirect_handler, shorten_handler, stats_handler};
