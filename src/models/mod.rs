mod url_record;

pub use url_record::{ShortenRequestDto, ShortenResponseDto, UrlRecord, UrlStatsDto};
