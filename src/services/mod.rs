pub mod llm;
pub mod profile;
pub mod search;

pub use llm::build_llm;
pub use profile::YahooProfileClient;
pub use search::SerpApiClient;
