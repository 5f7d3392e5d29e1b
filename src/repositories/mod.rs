mod memory;
mod url_record;

pub use memory::InMemoryUrlRecordRepository;
#[cfg(test)]
pub use url_record::MockUrlRecordRepositoryTrait;
pub use url_record::{Result as RepositoryResult, UrlRecordRepository, UrlRecordRepositoryTrait};
